//! Bit-packed streams for network message serialization.
//!
//! A message describes its wire layout once, against the [`Stream`] trait,
//! and that single procedure runs in three modes:
//! - [`WriteStream`] packs fields into 32-bit little-endian words
//! - [`ReadStream`] unpacks them and validates ranges
//! - [`MeasureStream`] counts the bits a write would produce without emitting
//!
//! Bits are packed least-significant first.

pub mod codec;
pub mod error;
pub mod measure;
pub mod reader;
pub mod stream;
pub mod writer;

pub use codec::{bits_required, StreamConfig, DEFAULT_MAX_STREAM_BYTES, WORD_BYTES};
pub use error::{Result, StreamError};
pub use measure::MeasureStream;
pub use reader::{BitReader, ReadStream};
pub use stream::{serialize_string, serialize_u16, serialize_u32, Stream, StreamMode};
pub use writer::{BitWriter, WriteStream};
