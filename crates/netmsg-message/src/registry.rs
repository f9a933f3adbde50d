use std::fmt;

use crate::block::BlockMessage;
use crate::error::{MessageError, Result};
use crate::message::{Message, MessageKind, MessageType};

type Constructor = Box<dyn Fn() -> MessageKind>;

struct Entry {
    name: &'static str,
    construct: Constructor,
}

/// Type-keyed table of message constructors.
///
/// Declares the closed range `0..num_types` of valid message types and, for
/// each registered type, how to build a fresh instance. Populated once at
/// configuration time, then handed to a [`MessageFactory`](crate::MessageFactory).
pub struct MessageRegistry {
    entries: Vec<Option<Entry>>,
}

impl MessageRegistry {
    /// Most types a registry can declare: every 15-bit type id.
    pub const MAX_TYPES: usize = MessageType::MAX as usize + 1;

    /// Create an empty registry for types `0..num_types`.
    pub fn new(num_types: usize) -> Result<Self> {
        if num_types > Self::MAX_TYPES {
            return Err(MessageError::InvalidTypeCount(num_types));
        }
        let mut entries = Vec::with_capacity(num_types);
        entries.resize_with(num_types, || None);
        Ok(Self { entries })
    }

    /// Register a plain message type built with `M::default()`.
    pub fn register<M: Message + Default>(&mut self, message_type: u16, name: &'static str) -> Result<()> {
        self.register_with(message_type, name, || MessageKind::plain(M::default()))
    }

    /// Register a block message type whose own fields are `M::default()`.
    pub fn register_block<M: Message + Default>(
        &mut self,
        message_type: u16,
        name: &'static str,
    ) -> Result<()> {
        self.register_with(message_type, name, || {
            MessageKind::Block(BlockMessage::with_fields(M::default()))
        })
    }

    /// Register an arbitrary constructor.
    pub fn register_with<F>(&mut self, message_type: u16, name: &'static str, construct: F) -> Result<()>
    where
        F: Fn() -> MessageKind + 'static,
    {
        let index = self.check_type(message_type)?;
        let slot = &mut self.entries[index];
        if slot.is_some() {
            return Err(MessageError::DuplicateType(message_type));
        }
        *slot = Some(Entry {
            name,
            construct: Box::new(construct),
        });
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<M: Message + Default>(mut self, message_type: u16, name: &'static str) -> Result<Self> {
        self.register::<M>(message_type, name)?;
        Ok(self)
    }

    /// Builder form of [`register_block`](Self::register_block).
    pub fn with_block<M: Message + Default>(
        mut self,
        message_type: u16,
        name: &'static str,
    ) -> Result<Self> {
        self.register_block::<M>(message_type, name)?;
        Ok(self)
    }

    /// Number of declared types; valid types are `0..num_types`.
    pub fn num_types(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Check if a type has a constructor.
    pub fn is_registered(&self, message_type: MessageType) -> bool {
        self.entry(message_type).is_some()
    }

    /// Name a type was registered under.
    pub fn name(&self, message_type: MessageType) -> Option<&'static str> {
        self.entry(message_type).map(|entry| entry.name)
    }

    /// Registered types with their names, in type order.
    pub fn types(&self) -> Vec<(MessageType, &'static str)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let entry = entry.as_ref()?;
                Some((MessageType::new(index as u16).ok()?, entry.name))
            })
            .collect()
    }

    /// Build a fresh instance of `message_type`, if registered.
    pub(crate) fn construct(&self, message_type: MessageType) -> Option<MessageKind> {
        self.entry(message_type).map(|entry| (entry.construct)())
    }

    fn entry(&self, message_type: MessageType) -> Option<&Entry> {
        self.entries
            .get(usize::from(message_type.get()))
            .and_then(Option::as_ref)
    }

    fn check_type(&self, message_type: u16) -> Result<usize> {
        let checked = MessageType::new(message_type)?;
        if checked.get() >= self.num_types() {
            return Err(MessageError::TypeOutOfRange {
                message_type,
                num_types: self.num_types(),
            });
        }
        Ok(usize::from(message_type))
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("num_types", &self.num_types())
            .field("types", &self.types())
            .finish()
    }
}
