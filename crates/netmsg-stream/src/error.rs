/// Errors that can occur while serializing a message to or from a bitstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A read asked for more bits than the stream holds.
    #[error("read past end of stream ({requested} bits requested, {remaining} remaining)")]
    Overflow { requested: usize, remaining: usize },

    /// An integer fell outside its declared range.
    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },

    /// The declared integer range is empty or wider than 32 bits.
    #[error("invalid integer range [{min}, {max}]")]
    InvalidRange { min: i64, max: i64 },

    /// A write would exceed the configured stream capacity.
    #[error("stream capacity exceeded ({bits} bits, max {max_bits})")]
    Capacity { bits: usize, max_bits: usize },

    /// A bit count outside 0..=32 was requested.
    #[error("invalid bit count {0} (expected 0..=32)")]
    InvalidBitCount(u32),

    /// A serialized string was longer than its declared maximum.
    #[error("string too long ({len} bytes, max {max})")]
    StringTooLong { len: usize, max: usize },

    /// A serialized string did not decode as UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, StreamError>;
