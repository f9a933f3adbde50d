use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use netmsg_stream::Stream;

use crate::allocator::Allocation;
use crate::block::{Block, BlockMessage};
use crate::error::{AttachError, MessageError, Result};

/// Application payload carried by a message.
///
/// Implement [`serialize`](Self::serialize) once; it runs against read,
/// write and measure streams alike. Writing a state and reading it back must
/// reproduce that state, and measuring must report exactly the bits written.
pub trait Message: AsAny + fmt::Debug + 'static {
    fn serialize(&mut self, stream: &mut dyn Stream) -> netmsg_stream::Result<()>;
}

/// Downcasting support for [`Message`] payloads. Implemented for every
/// `'static` type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A message type id: 15 bits, `0..=32767`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageType(u16);

impl MessageType {
    pub const MAX: u16 = 0x7FFF;

    pub fn new(value: u16) -> Result<Self> {
        if value > Self::MAX {
            return Err(MessageError::InvalidType(i64::from(value)));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for MessageType {
    type Error = MessageError;

    fn try_from(value: i64) -> Result<Self> {
        u16::try_from(value)
            .map_err(|_| MessageError::InvalidType(value))
            .and_then(Self::new)
    }
}

impl From<MessageType> for i64 {
    fn from(value: MessageType) -> Self {
        i64::from(value.0)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Factory-scoped identity of a live message, used for leak reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey(pub(crate) u64);

impl MessageKey {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of message shapes.
#[derive(Debug)]
pub enum MessageKind {
    Plain(Box<dyn Message>),
    Block(BlockMessage),
}

impl MessageKind {
    pub fn plain<M: Message>(payload: M) -> Self {
        Self::Plain(Box::new(payload))
    }

    /// A block message whose own fields are `payload`.
    pub fn block<M: Message>(payload: M) -> Self {
        Self::Block(BlockMessage::with_fields(payload))
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    pub fn payload(&self) -> &dyn Message {
        match self {
            Self::Plain(payload) => &**payload,
            Self::Block(block) => block.fields(),
        }
    }

    pub fn payload_mut(&mut self) -> &mut dyn Message {
        match self {
            Self::Plain(payload) => &mut **payload,
            Self::Block(block) => block.fields_mut(),
        }
    }

    pub fn as_block(&self) -> Option<&BlockMessage> {
        match self {
            Self::Block(block) => Some(block),
            Self::Plain(_) => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockMessage> {
        match self {
            Self::Block(block) => Some(block),
            Self::Plain(_) => None,
        }
    }

    /// Serialize the message's own fields. Block bytes are not included.
    pub fn serialize(&mut self, stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
        self.payload_mut().serialize(stream)
    }
}

pub(crate) struct MessageCell {
    key: MessageKey,
    owner: u64,
    message_type: MessageType,
    is_block: bool,
    id: Cell<u16>,
    refs: Cell<u32>,
    kind: RefCell<MessageKind>,
    footprint: RefCell<Option<Allocation>>,
}

impl MessageCell {
    pub(crate) fn new(
        key: MessageKey,
        owner: u64,
        message_type: MessageType,
        kind: MessageKind,
        footprint: Allocation,
    ) -> Self {
        Self {
            key,
            owner,
            message_type,
            is_block: kind.is_block(),
            id: Cell::new(0),
            refs: Cell::new(1),
            kind: RefCell::new(kind),
            footprint: RefCell::new(Some(footprint)),
        }
    }

    pub(crate) fn key(&self) -> MessageKey {
        self.key
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    pub(crate) fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub(crate) fn is_block(&self) -> bool {
        self.is_block
    }

    pub(crate) fn ref_count(&self) -> u32 {
        self.refs.get()
    }

    pub(crate) fn acquire(&self) -> Result<u32> {
        let refs = self.refs.get();
        if refs == 0 {
            return Err(MessageError::AcquireDestroyed(self.key));
        }
        let refs = refs
            .checked_add(1)
            .ok_or(MessageError::RefCountOverflow(self.key))?;
        self.refs.set(refs);
        Ok(refs)
    }

    /// Returns the remaining count. Zero means the caller must destroy.
    pub(crate) fn release(&self) -> Result<u32> {
        let refs = self.refs.get();
        if refs == 0 {
            return Err(MessageError::ReleaseDestroyed(self.key));
        }
        self.refs.set(refs - 1);
        Ok(refs - 1)
    }

    /// Free the attached block and the message footprint.
    ///
    /// Only valid at zero references. Idempotent: both resources are taken
    /// out before being freed.
    pub(crate) fn destroy(&self) -> Option<usize> {
        debug_assert_eq!(self.refs.get(), 0);
        let block = self
            .kind
            .borrow_mut()
            .as_block_mut()
            .and_then(BlockMessage::detach_block);
        let freed_block = block.as_ref().map(Block::len);
        drop(block);
        drop(self.footprint.borrow_mut().take());
        freed_block
    }
}

impl fmt::Debug for MessageCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("key", &self.key)
            .field("type", &self.message_type)
            .field("id", &self.id.get())
            .field("refs", &self.refs.get())
            .field("block", &self.is_block)
            .finish()
    }
}

/// One counted reference to a live message.
///
/// Not `Clone`: extra references come from
/// [`MessageFactory::acquire_message`](crate::MessageFactory::acquire_message),
/// and each handle goes back through
/// [`MessageFactory::release_message`](crate::MessageFactory::release_message),
/// which consumes it. Dropping a handle without releasing it leaks the
/// reference.
pub struct MessageRef {
    cell: Rc<MessageCell>,
}

impl MessageRef {
    pub(crate) fn new(cell: Rc<MessageCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Rc<MessageCell> {
        &self.cell
    }

    pub(crate) fn into_cell(self) -> Rc<MessageCell> {
        self.cell
    }

    pub fn key(&self) -> MessageKey {
        self.cell.key
    }

    /// Set by the sending channel: the reliable sequence number, or the
    /// packet sequence for unreliable delivery.
    pub fn set_id(&self, id: u16) {
        self.cell.id.set(id);
    }

    pub fn id(&self) -> u16 {
        self.cell.id.get()
    }

    pub fn message_type(&self) -> MessageType {
        self.cell.message_type
    }

    pub fn ref_count(&self) -> u32 {
        self.cell.refs.get()
    }

    pub fn is_block_message(&self) -> bool {
        self.cell.is_block
    }

    /// Borrow the message body.
    ///
    /// # Panics
    ///
    /// Panics if another handle to the same message holds [`kind_mut`](Self::kind_mut).
    pub fn kind(&self) -> Ref<'_, MessageKind> {
        self.cell.kind.borrow()
    }

    /// Mutably borrow the message body.
    ///
    /// # Panics
    ///
    /// Panics if another handle to the same message holds a borrow.
    pub fn kind_mut(&self) -> RefMut<'_, MessageKind> {
        self.cell.kind.borrow_mut()
    }

    /// Borrow the payload as a concrete type.
    pub fn payload<M: Message>(&self) -> Option<Ref<'_, M>> {
        Ref::filter_map(self.kind(), |kind| {
            kind.payload().as_any().downcast_ref::<M>()
        })
        .ok()
    }

    /// Mutably borrow the payload as a concrete type.
    pub fn payload_mut<M: Message>(&self) -> Option<RefMut<'_, M>> {
        RefMut::filter_map(self.kind_mut(), |kind| {
            kind.payload_mut().as_any_mut().downcast_mut::<M>()
        })
        .ok()
    }

    /// Serialize the message's own fields against `stream`.
    pub fn serialize(&self, stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
        self.kind_mut().serialize(stream)
    }

    /// Attach a block. The message owns it until detached or destroyed.
    ///
    /// On error the block comes back inside the [`AttachError`], unfreed.
    pub fn attach_block(&self, block: Block) -> std::result::Result<(), AttachError> {
        match self.kind_mut().as_block_mut() {
            Some(message) => message.attach_block(block),
            None => Err(AttachError {
                error: MessageError::NotBlockMessage(self.cell.message_type.get()),
                block,
            }),
        }
    }

    /// Detach the block, transferring ownership to the caller.
    pub fn detach_block(&self) -> Option<Block> {
        self.kind_mut()
            .as_block_mut()
            .and_then(BlockMessage::detach_block)
    }

    /// Size of the attached block in bytes; 0 when none is attached.
    pub fn block_size(&self) -> usize {
        self.kind().as_block().map_or(0, BlockMessage::block_size)
    }
}

impl fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.cell, f)
    }
}
