//! The three-mode serialization trait.
//!
//! Every primitive takes its field by `&mut` so the same procedure reads into
//! it, writes from it, or measures it, depending on the stream.

use crate::codec::{bits_required, checked_span};
use crate::error::{Result, StreamError};

/// Which direction a stream runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
    Measure,
}

/// A bitstream a message can serialize itself against.
pub trait Stream {
    /// The mode this stream runs in.
    fn mode(&self) -> StreamMode;

    /// Read into, write from, or measure the low `bits` of `value`.
    ///
    /// `bits` must be in `0..=32`; zero is a no-op.
    fn serialize_bits(&mut self, value: &mut u32, bits: u32) -> Result<()>;

    /// Pad with zero bits up to the next byte boundary.
    fn serialize_align(&mut self) -> Result<()>;

    /// Bits read, written or measured so far.
    fn bits_processed(&self) -> usize;

    /// Bits left to read. `None` for streams without a fixed end.
    fn bits_remaining(&self) -> Option<usize> {
        None
    }

    fn is_reading(&self) -> bool {
        self.mode() == StreamMode::Read
    }

    fn is_writing(&self) -> bool {
        self.mode() == StreamMode::Write
    }

    fn is_measuring(&self) -> bool {
        self.mode() == StreamMode::Measure
    }

    /// Serialize an integer constrained to `[min, max]` in the minimum bits.
    fn serialize_integer(&mut self, value: &mut i64, min: i64, max: i64) -> Result<()> {
        let span = checked_span(min, max)?;
        let bits = bits_required(min, max)?;

        if self.is_reading() {
            let mut offset = 0u32;
            self.serialize_bits(&mut offset, bits)?;
            if offset as u64 > span {
                return Err(StreamError::OutOfRange {
                    value: min.saturating_add(offset as i64),
                    min,
                    max,
                });
            }
            *value = min + offset as i64;
            return Ok(());
        }

        if *value < min || *value > max {
            return Err(StreamError::OutOfRange {
                value: *value,
                min,
                max,
            });
        }
        let mut offset = (*value as i128 - min as i128) as u32;
        self.serialize_bits(&mut offset, bits)
    }

    fn serialize_bool(&mut self, value: &mut bool) -> Result<()> {
        let mut bit = u32::from(*value);
        self.serialize_bits(&mut bit, 1)?;
        if self.is_reading() {
            *value = bit != 0;
        }
        Ok(())
    }

    /// Serialize raw bytes, byte aligned.
    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        self.serialize_align()?;
        for byte in data.iter_mut() {
            let mut value = u32::from(*byte);
            self.serialize_bits(&mut value, 8)?;
            if self.is_reading() {
                *byte = value as u8;
            }
        }
        Ok(())
    }
}

pub fn serialize_u16(stream: &mut dyn Stream, value: &mut u16) -> Result<()> {
    let mut wide = u32::from(*value);
    stream.serialize_bits(&mut wide, 16)?;
    if stream.is_reading() {
        *value = wide as u16;
    }
    Ok(())
}

pub fn serialize_u32(stream: &mut dyn Stream, value: &mut u32) -> Result<()> {
    stream.serialize_bits(value, 32)
}

/// Serialize a UTF-8 string of at most `max_len` bytes.
///
/// The length goes first as a ranged integer, then the bytes, aligned.
pub fn serialize_string(stream: &mut dyn Stream, value: &mut String, max_len: usize) -> Result<()> {
    let max = max_len as i64;
    if !stream.is_reading() && value.len() > max_len {
        return Err(StreamError::StringTooLong {
            len: value.len(),
            max: max_len,
        });
    }

    let mut len = value.len() as i64;
    stream.serialize_integer(&mut len, 0, max)?;

    if stream.is_reading() {
        let len = len as usize;
        stream.serialize_align()?;
        if let Some(remaining) = stream.bits_remaining() {
            if len * 8 > remaining {
                return Err(StreamError::Overflow {
                    requested: len * 8,
                    remaining,
                });
            }
        }
        let mut buf = vec![0u8; len];
        stream.serialize_bytes(&mut buf)?;
        *value = String::from_utf8(buf).map_err(|_| StreamError::InvalidUtf8)?;
        return Ok(());
    }

    let mut buf = value.clone().into_bytes();
    stream.serialize_bytes(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MeasureStream, ReadStream, WriteStream};

    #[test]
    fn integer_roundtrip_uses_minimum_bits() {
        let mut writer = WriteStream::new();
        let mut value = -3i64;
        writer.serialize_integer(&mut value, -10, 10).unwrap();
        assert_eq!(writer.bits_processed(), 5);

        let bytes = writer.finish();
        let mut reader = ReadStream::new(bytes);
        let mut read_back = 0i64;
        reader.serialize_integer(&mut read_back, -10, 10).unwrap();
        assert_eq!(read_back, -3);
        assert_eq!(reader.bits_processed(), 5);
    }

    #[test]
    fn write_rejects_out_of_range_integer() {
        let mut writer = WriteStream::new();
        let mut value = 11i64;
        let err = writer.serialize_integer(&mut value, 0, 10).unwrap_err();
        assert_eq!(
            err,
            StreamError::OutOfRange {
                value: 11,
                min: 0,
                max: 10
            }
        );
        assert_eq!(writer.bits_processed(), 0);
    }

    #[test]
    fn read_rejects_out_of_range_integer() {
        // 4 bits hold up to 15, but the declared range stops at 10.
        let mut writer = WriteStream::new();
        let mut raw = 15u32;
        writer.serialize_bits(&mut raw, 4).unwrap();

        let mut reader = ReadStream::new(writer.finish());
        let mut value = 0i64;
        assert!(matches!(
            reader.serialize_integer(&mut value, 0, 10),
            Err(StreamError::OutOfRange { value: 15, .. })
        ));
    }

    #[test]
    fn string_roundtrip_and_measure_agree() {
        let mut original = String::from("hello, netmsg");

        let mut measure = MeasureStream::new();
        serialize_string(&mut measure, &mut original, 64).unwrap();

        let mut writer = WriteStream::new();
        serialize_string(&mut writer, &mut original, 64).unwrap();
        assert_eq!(measure.bits_processed(), writer.bits_processed());

        let mut reader = ReadStream::new(writer.finish());
        let mut read_back = String::new();
        serialize_string(&mut reader, &mut read_back, 64).unwrap();
        assert_eq!(read_back, original);
    }

    #[test]
    fn string_longer_than_max_is_rejected() {
        let mut writer = WriteStream::new();
        let mut value = String::from("too long");
        assert!(matches!(
            serialize_string(&mut writer, &mut value, 4),
            Err(StreamError::StringTooLong { len: 8, max: 4 })
        ));
    }

    #[test]
    fn truncated_string_fails_before_reading_bytes() {
        let mut writer = WriteStream::new();
        let mut len = 1000i64;
        writer.serialize_integer(&mut len, 0, 4096).unwrap();
        let mut byte = 0x41u32;
        writer.serialize_align().unwrap();
        writer.serialize_bits(&mut byte, 8).unwrap();

        let mut reader = ReadStream::new(writer.finish());
        let mut text = String::from("untouched");
        let err = serialize_string(&mut reader, &mut text, 4096).unwrap_err();
        assert_eq!(
            err,
            StreamError::Overflow {
                requested: 8000,
                remaining: 16
            }
        );
        assert_eq!(text, "untouched");
        assert_eq!(reader.bits_processed(), 16);
    }

    #[test]
    fn bool_and_u16_roundtrip() {
        let mut flag = true;
        let mut word = 0xBEEFu16;

        let mut writer = WriteStream::new();
        writer.serialize_bool(&mut flag).unwrap();
        serialize_u16(&mut writer, &mut word).unwrap();
        assert_eq!(writer.bits_processed(), 17);

        let mut reader = ReadStream::new(writer.finish());
        let mut flag_back = false;
        let mut word_back = 0u16;
        reader.serialize_bool(&mut flag_back).unwrap();
        serialize_u16(&mut reader, &mut word_back).unwrap();
        assert!(flag_back);
        assert_eq!(word_back, 0xBEEF);
    }

    #[test]
    fn modes_are_reported() {
        assert_eq!(WriteStream::new().mode(), StreamMode::Write);
        assert_eq!(MeasureStream::new().mode(), StreamMode::Measure);
        assert_eq!(ReadStream::new(Vec::new()).mode(), StreamMode::Read);
        assert!(ReadStream::new(Vec::new()).is_reading());
    }
}
