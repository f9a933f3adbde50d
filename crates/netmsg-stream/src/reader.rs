use bytes::Bytes;

use crate::codec::{align_padding, check_bit_count, mask, WORD_BYTES};
use crate::error::{Result, StreamError};
use crate::stream::{Stream, StreamMode};

/// Unpacks bits written by [`BitWriter`](crate::BitWriter).
///
/// A trailing partial word is zero-extended.
pub struct BitReader {
    data: Bytes,
    scratch: u64,
    scratch_bits: u32,
    word_index: usize,
    bits_read: usize,
    num_bits: usize,
}

impl BitReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let num_bits = data.len() * 8;
        Self {
            data,
            scratch: 0,
            scratch_bits: 0,
            word_index: 0,
            bits_read: 0,
            num_bits,
        }
    }

    /// Read the next `bits` bits.
    ///
    /// Returns `Err(StreamError::Overflow)` without consuming anything when
    /// fewer than `bits` remain.
    pub fn read_bits(&mut self, bits: u32) -> Result<u32> {
        check_bit_count(bits)?;
        if bits == 0 {
            return Ok(0);
        }

        let remaining = self.bits_remaining();
        if bits as usize > remaining {
            return Err(StreamError::Overflow {
                requested: bits as usize,
                remaining,
            });
        }

        if self.scratch_bits < bits {
            self.scratch |= u64::from(self.next_word()) << self.scratch_bits;
            self.scratch_bits += 32;
        }

        let value = (self.scratch & mask(bits)) as u32;
        self.scratch >>= bits;
        self.scratch_bits -= bits;
        self.bits_read += bits as usize;
        Ok(value)
    }

    /// Skip the zero padding up to the next byte boundary.
    pub fn read_align(&mut self) -> Result<()> {
        let padding = align_padding(self.bits_read);
        self.read_bits(padding).map(|_| ())
    }

    pub fn bits_read(&self) -> usize {
        self.bits_read
    }

    pub fn bits_remaining(&self) -> usize {
        self.num_bits - self.bits_read
    }

    fn next_word(&mut self) -> u32 {
        let start = self.word_index * WORD_BYTES;
        let end = (start + WORD_BYTES).min(self.data.len());
        let mut word = [0u8; WORD_BYTES];
        if start < end {
            word[..end - start].copy_from_slice(&self.data[start..end]);
        }
        self.word_index += 1;
        u32::from_le_bytes(word)
    }
}

/// Read-mode [`Stream`] over a [`BitReader`].
pub struct ReadStream {
    reader: BitReader,
}

impl ReadStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            reader: BitReader::new(data),
        }
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &BitReader {
        &self.reader
    }
}

impl Stream for ReadStream {
    fn mode(&self) -> StreamMode {
        StreamMode::Read
    }

    fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<()> {
        *value = self.reader.read_bits(bits)?;
        Ok(())
    }

    fn serialize_align(&mut self) -> Result<()> {
        self.reader.read_align()
    }

    fn bits_processed(&self) -> usize {
        self.reader.bits_read()
    }

    fn bits_remaining(&self) -> Option<usize> {
        Some(self.reader.bits_remaining())
    }
}
