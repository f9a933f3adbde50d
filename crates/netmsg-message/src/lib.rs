//! Reference-counted network messages and the factory that owns them.
//!
//! Messages are created by a [`MessageFactory`] from a [`MessageRegistry`]
//! that maps type ids to constructors. Every holder of a message (send queue,
//! receive queue, application code) owns exactly one [`MessageRef`] and hands
//! it back through [`MessageFactory::release_message`]; the release that
//! drops the count to zero destroys the message, and frees any attached
//! [`Block`] through the allocator that produced it.
//!
//! Handles are `!Send`: one factory and its messages live on one thread.

pub mod allocator;
pub mod block;
pub mod config;
pub mod error;
pub mod factory;
pub mod message;
pub mod registry;

pub use allocator::{Allocation, Allocator, BudgetAllocator, HeapAllocator};
pub use block::{Block, BlockMessage, NoFields};
pub use config::{FactoryConfig, LeakTracking};
pub use error::{AttachError, MessageError, ReleaseError, Result};
pub use factory::{ErrorLevel, LeakReport, LeakedMessage, MessageFactory, ReleaseOutcome};
pub use message::{AsAny, Message, MessageKey, MessageKind, MessageRef, MessageType};
pub use registry::MessageRegistry;

pub use netmsg_stream as stream;
