use crate::codec::{align_padding, check_bit_count};
use crate::error::Result;
use crate::stream::{Stream, StreamMode};

/// Measure-mode [`Stream`]: counts bits, emits nothing.
///
/// Alignment padding is counted from the measured position, so the result
/// equals what a [`WriteStream`](crate::WriteStream) starting at bit zero
/// would produce for the same fields.
#[derive(Debug, Default)]
pub struct MeasureStream {
    bits: usize,
}

impl MeasureStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes a write of the measured fields would occupy, rounded up to whole bytes.
    pub fn bytes_processed(&self) -> usize {
        self.bits.div_ceil(8)
    }
}

impl Stream for MeasureStream {
    fn mode(&self) -> StreamMode {
        StreamMode::Measure
    }

    fn serialize_bits(&mut self, _value: &mut u32, bits: u32) -> Result<()> {
        check_bit_count(bits)?;
        self.bits += bits as usize;
        Ok(())
    }

    fn serialize_align(&mut self) -> Result<()> {
        self.bits += align_padding(self.bits) as usize;
        Ok(())
    }

    fn bits_processed(&self) -> usize {
        self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriteStream;

    fn describe(stream: &mut dyn Stream) -> Result<()> {
        let mut flag = true;
        let mut small = 3i64;
        let mut raw = [1u8, 2, 3];
        stream.serialize_bool(&mut flag)?;
        stream.serialize_integer(&mut small, 0, 7)?;
        stream.serialize_bytes(&mut raw)?;
        Ok(())
    }

    #[test]
    fn measure_matches_write_including_alignment() {
        let mut measure = MeasureStream::new();
        describe(&mut measure).unwrap();

        let mut writer = WriteStream::new();
        describe(&mut writer).unwrap();

        // 1 + 3 bits, 4 bits padding, 24 bits payload
        assert_eq!(measure.bits_processed(), 32);
        assert_eq!(measure.bits_processed(), writer.bits_processed());
        assert_eq!(measure.bytes_processed(), 4);
    }

    #[test]
    fn measure_does_not_touch_values() {
        let mut measure = MeasureStream::new();
        let mut value = 42u32;
        measure.serialize_bits(&mut value, 7).unwrap();
        assert_eq!(value, 42);
        assert_eq!(measure.bits_processed(), 7);
    }
}
