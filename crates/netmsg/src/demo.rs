//! Demo message set.
//!
//! Four types covering each shape the factory handles: a plain message, a
//! block message with its own fields, a plain message with ranged, boolean
//! and string fields, and a block message with no fields at all.

use std::rc::Rc;

use netmsg_message::{
    Allocator, AsAny, Block, Message, MessageError, MessageFactory, MessageKind, MessageRef,
    MessageRegistry, NoFields, ReleaseError,
};
use netmsg_stream::{
    serialize_string, serialize_u16, MeasureStream, ReadStream, Stream, StreamError, WriteStream,
};

pub const TEST: u16 = 0;
pub const BLOCK: u16 = 1;
pub const CHAT: u16 = 2;
pub const SNAPSHOT: u16 = 3;
pub const NUM_TYPES: usize = 4;

/// Longest chat text in bytes.
pub const MAX_CHAT_LEN: usize = 256;
/// Highest chat room number.
pub const MAX_ROOM: i64 = 15;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub sequence: u16,
}

impl Message for TestMessage {
    fn serialize(&mut self, stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
        serialize_u16(stream, &mut self.sequence)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestBlockMessage {
    pub sequence: u16,
}

impl Message for TestBlockMessage {
    fn serialize(&mut self, stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
        serialize_u16(stream, &mut self.sequence)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub room: i64,
    pub urgent: bool,
    pub text: String,
}

impl Message for ChatMessage {
    fn serialize(&mut self, stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
        stream.serialize_integer(&mut self.room, 0, MAX_ROOM)?;
        stream.serialize_bool(&mut self.urgent)?;
        serialize_string(stream, &mut self.text, MAX_CHAT_LEN)
    }
}

/// Registry holding the demo types.
pub fn registry() -> Result<MessageRegistry, MessageError> {
    MessageRegistry::new(NUM_TYPES)?
        .with::<TestMessage>(TEST, "test")?
        .with_block::<TestBlockMessage>(BLOCK, "block")?
        .with::<ChatMessage>(CHAT, "chat")?
        .with_block::<NoFields>(SNAPSHOT, "snapshot")
}

/// Fill a demo message with values derived from `seed`.
///
/// Block messages also get a block of `block_size` bytes from `allocator`,
/// when one can be allocated.
pub fn populate(
    message: &MessageRef,
    seed: u16,
    allocator: &Rc<dyn Allocator>,
    block_size: usize,
) -> Result<(), MessageError> {
    if let Some(mut test) = message.payload_mut::<TestMessage>() {
        test.sequence = seed;
    }
    if let Some(mut test) = message.payload_mut::<TestBlockMessage>() {
        test.sequence = seed;
    }
    if let Some(mut chat) = message.payload_mut::<ChatMessage>() {
        chat.room = i64::from(seed) % (MAX_ROOM + 1);
        chat.urgent = seed % 2 == 1;
        chat.text = format!("message {seed}");
    }

    if message.is_block_message() && block_size > 0 {
        let fill: Vec<u8> = (0..block_size).map(|i| (i as u16 ^ seed) as u8).collect();
        if let Some(block) = Block::copy_from(Rc::clone(allocator), &fill) {
            message.attach_block(block).map_err(|err| err.error)?;
        }
    }
    Ok(())
}

/// Errors from a demo round trip.
#[derive(Debug, thiserror::Error)]
pub enum RoundTripError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Release(#[from] ReleaseError),
}

/// Bit counts observed by one write/measure/read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTrip {
    pub measured_bits: usize,
    pub written_bits: usize,
    pub read_bits: usize,
    pub wire_bytes: usize,
    pub fields_match: bool,
}

impl RoundTrip {
    /// All three bit counts agree and the copy equals the original.
    pub fn is_exact(&self) -> bool {
        self.measured_bits == self.written_bits
            && self.written_bits == self.read_bits
            && self.fields_match
    }
}

/// Create a message, populate it, then measure, write and read it back into
/// a fresh instance of the same type.
///
/// Returns `Ok(None)` if the factory could not allocate either message. Both
/// messages are released before returning.
pub fn round_trip(
    factory: &mut MessageFactory,
    message_type: impl Into<i64>,
    seed: u16,
) -> Result<Option<RoundTrip>, RoundTripError> {
    let message_type = message_type.into();
    let Some(original) = factory.create_message(message_type)? else {
        return Ok(None);
    };
    let Some(copy) = factory.create_message(message_type)? else {
        factory.release_message(original)?;
        return Ok(None);
    };

    let allocator = Rc::clone(factory.allocator());
    let result = populate(&original, seed, &allocator, 0)
        .map_err(RoundTripError::from)
        .and_then(|()| measure_write_read(&original, &copy));

    factory.release_message(original)?;
    factory.release_message(copy)?;
    result.map(Some)
}

/// Bits a default instance of `message_type` measures at.
pub fn measure_default(
    factory: &mut MessageFactory,
    message_type: u16,
) -> Result<Option<usize>, RoundTripError> {
    let Some(message) = factory.create_message(message_type)? else {
        return Ok(None);
    };
    let mut measure = MeasureStream::new();
    let result = message.serialize(&mut measure);
    factory.release_message(message)?;
    result?;
    Ok(Some(measure.bits_processed()))
}

fn measure_write_read(original: &MessageRef, copy: &MessageRef) -> Result<RoundTrip, RoundTripError> {
    let mut measure = MeasureStream::new();
    original.serialize(&mut measure)?;

    let mut writer = WriteStream::new();
    original.serialize(&mut writer)?;
    let written_bits = writer.bits_processed();
    let wire = writer.finish();

    let mut reader = ReadStream::new(wire.clone());
    copy.serialize(&mut reader)?;

    Ok(RoundTrip {
        measured_bits: measure.bits_processed(),
        written_bits,
        read_bits: reader.bits_processed(),
        wire_bytes: wire.len(),
        fields_match: same_fields(&original.kind(), &copy.kind()),
    })
}

fn same_fields(a: &MessageKind, b: &MessageKind) -> bool {
    fields_eq::<TestMessage>(a, b)
        .or_else(|| fields_eq::<TestBlockMessage>(a, b))
        .or_else(|| fields_eq::<ChatMessage>(a, b))
        .or_else(|| fields_eq::<NoFields>(a, b))
        .unwrap_or(false)
}

fn fields_eq<M: Message + PartialEq>(a: &MessageKind, b: &MessageKind) -> Option<bool> {
    let a = a.payload().as_any().downcast_ref::<M>()?;
    let b = b.payload().as_any().downcast_ref::<M>()?;
    Some(a == b)
}
