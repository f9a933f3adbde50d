//! Attached blocks: large out-of-band buffers owned by a block message.
//!
//! A block message owns at most one [`Block`]. The block bytes never go
//! through the message's own `serialize`; the channel layer carries them,
//! fragmenting over reliable-ordered channels when they exceed one packet.

use std::fmt;
use std::rc::Rc;

use netmsg_stream::Stream;

use crate::allocator::{Allocation, Allocator};
use crate::error::{AttachError, MessageError, Result};
use crate::message::Message;

/// A non-empty buffer tied to the allocator that must free it.
///
/// Dropping a block frees it. [`into_parts`](Self::into_parts) releases it
/// from that obligation, handing the buffer and allocator to the caller.
pub struct Block {
    allocation: Allocation,
}

impl Block {
    /// Wrap a buffer produced by `allocator`.
    ///
    /// Returns `Err(MessageError::EmptyBlock)` for an empty buffer, which is
    /// handed back to `allocator` first.
    pub fn new(allocator: Rc<dyn Allocator>, data: Box<[u8]>) -> Result<Self> {
        let allocation = Allocation::from_parts(allocator, data);
        if allocation.is_empty() {
            return Err(MessageError::EmptyBlock);
        }
        Ok(Self { allocation })
    }

    /// Allocate a zeroed block of `size` bytes.
    ///
    /// Returns `None` when `size` is zero or the allocator is exhausted.
    pub fn allocate(allocator: Rc<dyn Allocator>, size: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        Allocation::new(allocator, size).map(|allocation| Self { allocation })
    }

    /// Allocate a block holding a copy of `bytes`.
    pub fn copy_from(allocator: Rc<dyn Allocator>, bytes: &[u8]) -> Option<Self> {
        let mut block = Self::allocate(allocator, bytes.len())?;
        block.data_mut().copy_from_slice(bytes);
        Some(block)
    }

    pub fn data(&self) -> &[u8] {
        self.allocation.data()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.allocation.data_mut()
    }

    pub fn len(&self) -> usize {
        self.allocation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocation.is_empty()
    }

    pub fn allocator(&self) -> &Rc<dyn Allocator> {
        self.allocation.allocator()
    }

    /// Take the buffer out without freeing it.
    pub fn into_parts(self) -> (Box<[u8]>, Rc<dyn Allocator>) {
        self.allocation.into_parts()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.len())
            .field("allocator", &self.allocator().name())
            .finish()
    }
}

/// Fields of a block message that carries nothing but its block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoFields;

impl Message for NoFields {
    fn serialize(&mut self, _stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
        Ok(())
    }
}

/// A message that may own one attached [`Block`].
#[derive(Debug)]
pub struct BlockMessage {
    fields: Box<dyn Message>,
    block: Option<Block>,
}

impl BlockMessage {
    /// A block message with no fields of its own.
    pub fn new() -> Self {
        Self::with_fields(NoFields)
    }

    pub fn with_fields<M: Message>(fields: M) -> Self {
        Self {
            fields: Box::new(fields),
            block: None,
        }
    }

    pub fn fields(&self) -> &dyn Message {
        &*self.fields
    }

    pub fn fields_mut(&mut self) -> &mut dyn Message {
        &mut *self.fields
    }

    /// Attach `block`; the message owns it from here on.
    ///
    /// Only one block may be attached at a time. A rejected block is handed
    /// back inside the error, unfreed.
    pub fn attach_block(&mut self, block: Block) -> std::result::Result<(), AttachError> {
        if let Some(attached) = &self.block {
            return Err(AttachError {
                error: MessageError::BlockAlreadyAttached {
                    size: attached.len(),
                },
                block,
            });
        }
        self.block = Some(block);
        Ok(())
    }

    /// Detach the block without freeing it; ownership moves to the caller.
    pub fn detach_block(&mut self) -> Option<Block> {
        self.block.take()
    }

    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    pub fn block_mut(&mut self) -> Option<&mut Block> {
        self.block.as_mut()
    }

    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }

    /// Allocator of the attached block, if any.
    pub fn allocator(&self) -> Option<&Rc<dyn Allocator>> {
        self.block.as_ref().map(Block::allocator)
    }

    pub fn block_data(&self) -> Option<&[u8]> {
        self.block.as_ref().map(Block::data)
    }

    /// Attached block size in bytes; 0 when none is attached.
    pub fn block_size(&self) -> usize {
        self.block.as_ref().map_or(0, Block::len)
    }
}

impl Default for BlockMessage {
    fn default() -> Self {
        Self::new()
    }
}
