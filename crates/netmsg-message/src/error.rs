use crate::block::Block;
use crate::message::{MessageKey, MessageRef};

/// Caller bugs detected by the message core.
///
/// None of these are recoverable conditions: each one means a collaborator
/// broke the ownership protocol, and the operation that reported it left all
/// state untouched. Allocation failure is not an error here; it surfaces as an
/// absent message plus [`ErrorLevel::FailedToAllocate`](crate::ErrorLevel).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The value cannot be a message type at all.
    #[error("invalid message type {0} (expected 0..=32767)")]
    InvalidType(i64),

    /// The type is valid but outside this factory's range.
    #[error("message type {message_type} out of range (factory has {num_types} types)")]
    TypeOutOfRange { message_type: u16, num_types: u16 },

    /// A registry was declared with more types than fit in 15 bits.
    #[error("invalid type count {0} (max 32768)")]
    InvalidTypeCount(usize),

    /// A constructor was registered twice for one type.
    #[error("message type {0} already registered")]
    DuplicateType(u16),

    /// Acquire on a message whose count already reached zero.
    #[error("acquire on destroyed message {0}")]
    AcquireDestroyed(MessageKey),

    /// Release on a message whose count already reached zero.
    #[error("release on destroyed message {0}")]
    ReleaseDestroyed(MessageKey),

    /// The reference count would wrap.
    #[error("reference count overflow on message {0}")]
    RefCountOverflow(MessageKey),

    /// The message was created by a different factory.
    #[error("message {0} belongs to another factory")]
    ForeignMessage(MessageKey),

    /// Blocks must hold at least one byte.
    #[error("cannot attach an empty block")]
    EmptyBlock,

    /// A block is already attached; detach it first.
    #[error("block already attached ({size} bytes)")]
    BlockAlreadyAttached { size: usize },

    /// Block operations need a block message.
    #[error("message type {0} is not a block message")]
    NotBlockMessage(u16),
}

pub type Result<T> = std::result::Result<T, MessageError>;

/// A release the factory refused. The handle comes back untouched, still
/// holding its reference.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ReleaseError {
    pub error: MessageError,
    pub message: MessageRef,
}

impl ReleaseError {
    pub fn into_message(self) -> MessageRef {
        self.message
    }
}

/// A block attach that was refused. The caller keeps the block.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AttachError {
    pub error: MessageError,
    pub block: Block,
}

impl AttachError {
    pub fn into_block(self) -> Block {
        self.block
    }
}
