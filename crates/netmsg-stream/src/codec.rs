use crate::error::{Result, StreamError};

/// Streams are flushed in 32-bit words.
pub const WORD_BYTES: usize = 4;

/// Default maximum write stream size: 64 KiB.
pub const DEFAULT_MAX_STREAM_BYTES: usize = 64 * 1024;

/// Configuration for write streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Maximum number of bytes a write stream may emit. Default: 64 KiB.
    ///
    /// Output is whole 32-bit words, so the usable cap is `max_bytes`
    /// rounded down to a multiple of [`WORD_BYTES`].
    pub max_bytes: usize,
}

impl StreamConfig {
    /// Capacity in bits: the whole words that fit in `max_bytes`.
    pub fn max_bits(&self) -> usize {
        (self.max_bytes / WORD_BYTES).saturating_mul(WORD_BYTES * 8)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_STREAM_BYTES,
        }
    }
}

/// Number of bits needed to encode any integer in `[min, max]`.
///
/// A range holding a single value needs zero bits.
pub fn bits_required(min: i64, max: i64) -> Result<u32> {
    let span = checked_span(min, max)?;
    Ok(u64::BITS - span.leading_zeros())
}

/// `max - min`, rejecting empty ranges and ranges wider than 32 bits.
pub(crate) fn checked_span(min: i64, max: i64) -> Result<u64> {
    if min > max {
        return Err(StreamError::InvalidRange { min, max });
    }
    let span = (max as i128 - min as i128) as u128;
    if span > u32::MAX as u128 {
        return Err(StreamError::InvalidRange { min, max });
    }
    Ok(span as u64)
}

/// Low `bits` set.
pub(crate) fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

pub(crate) fn check_bit_count(bits: u32) -> Result<()> {
    if bits > 32 {
        return Err(StreamError::InvalidBitCount(bits));
    }
    Ok(())
}

/// Zero bits needed to reach the next byte boundary from `bits`.
pub(crate) fn align_padding(bits: usize) -> u32 {
    ((8 - bits % 8) % 8) as u32
}
