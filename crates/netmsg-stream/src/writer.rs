use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{align_padding, check_bit_count, mask, StreamConfig, WORD_BYTES};
use crate::error::{Result, StreamError};
use crate::stream::{Stream, StreamMode};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Packs bits into 32-bit little-endian words.
///
/// Bits accumulate in a 64-bit scratch register and are flushed a word at a
/// time, so the finished buffer is always a whole number of words.
pub struct BitWriter {
    buf: BytesMut,
    scratch: u64,
    scratch_bits: u32,
    bits_written: usize,
    max_bits: usize,
}

impl BitWriter {
    /// Create a writer with default configuration.
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// Create a writer with explicit configuration.
    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(config.max_bytes)),
            scratch: 0,
            scratch_bits: 0,
            bits_written: 0,
            max_bits: config.max_bits(),
        }
    }

    /// Append the low `bits` of `value`. Higher bits are ignored.
    pub fn write_bits(&mut self, value: u32, bits: u32) -> Result<()> {
        check_bit_count(bits)?;
        if bits == 0 {
            return Ok(());
        }

        let total = self.bits_written + bits as usize;
        if total > self.max_bits {
            return Err(StreamError::Capacity {
                bits: total,
                max_bits: self.max_bits,
            });
        }

        self.scratch |= (u64::from(value) & mask(bits)) << self.scratch_bits;
        self.scratch_bits += bits;
        if self.scratch_bits >= 32 {
            self.buf.put_u32_le(self.scratch as u32);
            self.scratch >>= 32;
            self.scratch_bits -= 32;
        }
        self.bits_written = total;
        Ok(())
    }

    /// Zero-pad to the next byte boundary.
    pub fn write_align(&mut self) -> Result<()> {
        let padding = align_padding(self.bits_written);
        self.write_bits(0, padding)
    }

    pub fn bits_written(&self) -> usize {
        self.bits_written
    }

    /// Bytes the finished buffer will occupy.
    pub fn bytes_written(&self) -> usize {
        self.bits_written.div_ceil(32) * WORD_BYTES
    }

    /// Flush any partial word and return the packed buffer.
    pub fn finish(mut self) -> Bytes {
        if self.scratch_bits > 0 {
            self.buf.put_u32_le(self.scratch as u32);
            self.scratch = 0;
            self.scratch_bits = 0;
        }
        self.buf.freeze()
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-mode [`Stream`] over a [`BitWriter`].
pub struct WriteStream {
    writer: BitWriter,
}

impl WriteStream {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            writer: BitWriter::with_config(config),
        }
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &BitWriter {
        &self.writer
    }

    /// Flush and return the packed bytes.
    pub fn finish(self) -> Bytes {
        self.writer.finish()
    }
}

impl Default for WriteStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for WriteStream {
    fn mode(&self) -> StreamMode {
        StreamMode::Write
    }

    fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<()> {
        self.writer.write_bits(*value, bits)
    }

    fn serialize_align(&mut self) -> Result<()> {
        self.writer.write_align()
    }

    fn bits_processed(&self) -> usize {
        self.writer.bits_written()
    }
}
