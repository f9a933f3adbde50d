//! Reference-counted network messages with a bounded-type factory.
//!
//! # Crate Structure
//!
//! - [`stream`]: Bit-packed read/write/measure streams
//! - [`message`]: Messages, attached blocks, allocators and the message factory
//! - [`demo`]: A small set of message types used by the CLI and tests

/// Re-export stream types.
pub mod stream {
    pub use netmsg_stream::*;
}

/// Re-export message types.
pub mod message {
    pub use netmsg_message::*;
}

pub mod demo;
