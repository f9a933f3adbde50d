use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use crate::allocator::{Allocation, Allocator};
use crate::config::{FactoryConfig, LeakTracking};
use crate::error::{MessageError, ReleaseError, Result};
use crate::message::{MessageCell, MessageKey, MessageRef, MessageType};
use crate::registry::MessageRegistry;

/// Bytes charged against the factory allocator per live message.
const MESSAGE_FOOTPRINT: usize = mem::size_of::<MessageCell>();

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Sticky factory error level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorLevel {
    /// All is well.
    #[default]
    NoError,
    /// A message could not be created; the allocator is likely exhausted.
    FailedToAllocate,
}

impl ErrorLevel {
    pub fn is_error(self) -> bool {
        self != ErrorLevel::NoError
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorLevel::NoError => "none",
            ErrorLevel::FailedToAllocate => "failed_to_allocate",
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a release did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// No message was given.
    Absent,
    /// Other references remain.
    Retained { ref_count: u32 },
    /// That was the last reference; the message is gone.
    Destroyed,
}

/// One message still alive at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakedMessage {
    pub key: MessageKey,
    pub message_type: MessageType,
    pub ref_count: u32,
    pub is_block: bool,
}

impl fmt::Display for LeakedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "leaked message {} (type {}, refcount {})",
            self.key, self.message_type, self.ref_count
        )
    }
}

/// Messages a factory still tracked when it was inspected or torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// `false` when leak tracking was off, in which case `leaks` is empty
    /// and says nothing.
    pub tracked: bool,
    pub leaks: Vec<LeakedMessage>,
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }
}

/// Creates and destroys messages for one session.
///
/// The factory is the only place messages are built and the only place they
/// are finally freed. It never frees its allocator; whoever configured the
/// factory owns that.
pub struct MessageFactory {
    id: u64,
    allocator: Rc<dyn Allocator>,
    registry: MessageRegistry,
    config: FactoryConfig,
    error_level: ErrorLevel,
    next_key: u64,
    live: Option<BTreeMap<MessageKey, Rc<MessageCell>>>,
    torn_down: bool,
}

impl MessageFactory {
    /// Create a factory with default config.
    pub fn new(allocator: Rc<dyn Allocator>, registry: MessageRegistry) -> Self {
        Self::with_config(allocator, registry, FactoryConfig::default())
    }

    /// Create a factory with explicit config.
    pub fn with_config(
        allocator: Rc<dyn Allocator>,
        registry: MessageRegistry,
        config: FactoryConfig,
    ) -> Self {
        let live = config.leak_tracking.is_enabled().then(BTreeMap::new);
        Self {
            id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            allocator,
            registry,
            config,
            error_level: ErrorLevel::NoError,
            next_key: 0,
            live,
            torn_down: false,
        }
    }

    /// Create a message by type, holding one reference.
    ///
    /// `Err` means the type is invalid or outside `0..num_types`; nothing is
    /// allocated. `Ok(None)` means the message could not be allocated, and
    /// the error level is now [`ErrorLevel::FailedToAllocate`]. Always check
    /// for `None` before use.
    pub fn create_message(&mut self, message_type: impl Into<i64>) -> Result<Option<MessageRef>> {
        let message_type = self.check_type(message_type.into())?;

        let Some(footprint) = Allocation::new(Rc::clone(&self.allocator), MESSAGE_FOOTPRINT)
        else {
            warn!(
                message_type = message_type.get(),
                allocator = self.allocator.name(),
                "failed to allocate message"
            );
            self.error_level = ErrorLevel::FailedToAllocate;
            return Ok(None);
        };

        let Some(kind) = self.registry.construct(message_type) else {
            warn!(
                message_type = message_type.get(),
                "no constructor registered for message type"
            );
            self.error_level = ErrorLevel::FailedToAllocate;
            return Ok(None);
        };

        self.next_key += 1;
        let key = MessageKey(self.next_key);
        let cell = Rc::new(MessageCell::new(key, self.id, message_type, kind, footprint));

        if let Some(live) = self.live.as_mut() {
            live.insert(key, Rc::clone(&cell));
        }

        debug!(
            %key,
            message_type = message_type.get(),
            block = cell.is_block(),
            "created message"
        );
        Ok(Some(MessageRef::new(cell)))
    }

    /// Add a reference, returning the new handle.
    ///
    /// `None` in, `None` out.
    pub fn acquire_message<'a>(
        &self,
        message: impl Into<Option<&'a MessageRef>>,
    ) -> Result<Option<MessageRef>> {
        let Some(message) = message.into() else {
            return Ok(None);
        };
        let cell = message.cell();
        self.check_owner(cell)?;
        cell.acquire().inspect_err(|err| warn!(%err, "acquire rejected"))?;
        Ok(Some(MessageRef::new(Rc::clone(cell))))
    }

    /// Give back one reference, destroying the message on the last one.
    ///
    /// Consumes the handle. `None` is a no-op. A rejected release returns the
    /// handle inside the [`ReleaseError`] with its reference still counted.
    pub fn release_message(
        &mut self,
        message: impl Into<Option<MessageRef>>,
    ) -> std::result::Result<ReleaseOutcome, ReleaseError> {
        let Some(message) = message.into() else {
            return Ok(ReleaseOutcome::Absent);
        };
        if let Err(error) = self.check_owner(message.cell()) {
            return Err(ReleaseError { error, message });
        }
        let released = message.cell().release();
        let ref_count = match released {
            Ok(ref_count) => ref_count,
            Err(error) => {
                warn!(%error, "release rejected");
                return Err(ReleaseError { error, message });
            }
        };

        let cell = message.into_cell();
        if ref_count > 0 {
            return Ok(ReleaseOutcome::Retained { ref_count });
        }

        self.destroy(&cell);
        Ok(ReleaseOutcome::Destroyed)
    }

    /// Number of message types; valid types are `0..num_types`.
    pub fn num_types(&self) -> u16 {
        self.registry.num_types()
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    pub fn allocator(&self) -> &Rc<dyn Allocator> {
        &self.allocator
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Sticky until [`clear_error_level`](Self::clear_error_level). The
    /// session decides whether a non-`NoError` level means disconnect.
    pub fn error_level(&self) -> ErrorLevel {
        self.error_level
    }

    pub fn clear_error_level(&mut self) {
        self.error_level = ErrorLevel::NoError;
    }

    /// Live messages, when leak tracking is on.
    pub fn live_messages(&self) -> Option<usize> {
        self.live.as_ref().map(BTreeMap::len)
    }

    /// Snapshot of tracked messages that have not been destroyed.
    pub fn leaks(&self) -> LeakReport {
        let Some(live) = &self.live else {
            return LeakReport::default();
        };
        LeakReport {
            tracked: true,
            leaks: live
                .values()
                .map(|cell| LeakedMessage {
                    key: cell.key(),
                    message_type: cell.message_type(),
                    ref_count: cell.ref_count(),
                    is_block: cell.is_block(),
                })
                .collect(),
        }
    }

    /// Tear the factory down and report leaks.
    ///
    /// # Panics
    ///
    /// Panics in [`LeakTracking::Strict`] mode if any message leaked.
    pub fn shutdown(mut self) -> LeakReport {
        self.teardown()
    }

    fn teardown(&mut self) -> LeakReport {
        self.torn_down = true;
        let report = self.leaks();
        if report.is_clean() {
            return report;
        }

        error!(count = report.len(), "message factory torn down with leaked messages");
        for leak in &report.leaks {
            error!(
                key = %leak.key,
                message_type = leak.message_type.get(),
                ref_count = leak.ref_count,
                "{leak}"
            );
        }

        if self.config.leak_tracking == LeakTracking::Strict && !std::thread::panicking() {
            panic!("{} messages leaked", report.len());
        }
        report
    }

    fn destroy(&mut self, cell: &Rc<MessageCell>) {
        if let Some(live) = self.live.as_mut() {
            live.remove(&cell.key());
        }
        let block = cell.destroy();
        debug!(
            key = %cell.key(),
            message_type = cell.message_type().get(),
            block_bytes = block.unwrap_or(0),
            "destroyed message"
        );
    }

    fn check_type(&self, value: i64) -> Result<MessageType> {
        let message_type = MessageType::try_from(value)?;
        if message_type.get() >= self.num_types() {
            return Err(MessageError::TypeOutOfRange {
                message_type: message_type.get(),
                num_types: self.num_types(),
            });
        }
        Ok(message_type)
    }

    fn check_owner(&self, cell: &MessageCell) -> Result<()> {
        if cell.owner() != self.id {
            warn!(key = %cell.key(), "message from another factory");
            return Err(MessageError::ForeignMessage(cell.key()));
        }
        Ok(())
    }
}

impl Drop for MessageFactory {
    fn drop(&mut self) {
        if !self.torn_down {
            self.teardown();
        }
    }
}

impl fmt::Debug for MessageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFactory")
            .field("num_types", &self.num_types())
            .field("allocator", &self.allocator.name())
            .field("error_level", &self.error_level)
            .field("live", &self.live_messages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use netmsg_stream::{serialize_u16, Stream};

    use super::*;
    use crate::allocator::{BudgetAllocator, HeapAllocator};
    use crate::block::{Block, NoFields};
    use crate::message::Message;

    const PING: u16 = 0;
    const SNAPSHOT: u16 = 1;
    const UNREGISTERED: u16 = 2;
    const NUM_TYPES: usize = 3;

    #[derive(Debug, Default, PartialEq)]
    struct Ping {
        sequence: u16,
    }

    impl Message for Ping {
        fn serialize(&mut self, stream: &mut dyn Stream) -> netmsg_stream::Result<()> {
            serialize_u16(stream, &mut self.sequence)
        }
    }

    fn registry() -> MessageRegistry {
        MessageRegistry::new(NUM_TYPES)
            .unwrap()
            .with::<Ping>(PING, "ping")
            .unwrap()
            .with_block::<NoFields>(SNAPSHOT, "snapshot")
            .unwrap()
    }

    fn tracked(allocator: Rc<dyn Allocator>) -> MessageFactory {
        MessageFactory::with_config(
            allocator,
            registry(),
            FactoryConfig::with_leak_tracking(LeakTracking::Report),
        )
    }

    #[test]
    fn create_assigns_type_and_one_reference() {
        let mut factory = tracked(Rc::new(HeapAllocator));
        let message = factory.create_message(PING).unwrap().unwrap();

        assert_eq!(message.message_type().get(), PING);
        assert_eq!(message.ref_count(), 1);
        assert_eq!(message.id(), 0);
        assert!(!message.is_block_message());
        assert_eq!(factory.live_messages(), Some(1));

        assert_eq!(factory.release_message(message).unwrap(), ReleaseOutcome::Destroyed);
        assert_eq!(factory.live_messages(), Some(0));
        assert!(factory.shutdown().is_clean());
    }

    #[test]
    fn destroyed_exactly_when_releases_exceed_acquires() {
        let budget = Rc::new(BudgetAllocator::new(4096));
        let mut factory = tracked(budget.clone());

        let first = factory.create_message(PING).unwrap().unwrap();
        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(factory.acquire_message(&first).unwrap().unwrap());
        }
        assert_eq!(first.ref_count(), 5);
        handles.push(first);

        while let Some(handle) = handles.pop() {
            let outcome = factory.release_message(handle).unwrap();
            if handles.is_empty() {
                assert_eq!(outcome, ReleaseOutcome::Destroyed);
            } else {
                assert_eq!(
                    outcome,
                    ReleaseOutcome::Retained {
                        ref_count: handles.len() as u32
                    }
                );
                assert_eq!(budget.frees(), 0);
            }
        }

        assert_eq!(budget.allocations(), 1);
        assert_eq!(budget.frees(), 1);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn absent_references_are_no_ops() {
        let mut factory = tracked(Rc::new(HeapAllocator));
        assert!(factory.acquire_message(None::<&MessageRef>).unwrap().is_none());
        assert_eq!(
            factory.release_message(None::<MessageRef>).unwrap(),
            ReleaseOutcome::Absent
        );
    }

    #[test]
    fn out_of_range_types_are_rejected_without_allocating() {
        let budget = Rc::new(BudgetAllocator::new(4096));
        let mut factory = tracked(budget.clone());

        assert_eq!(
            factory.create_message(-1).unwrap_err(),
            MessageError::InvalidType(-1)
        );
        assert_eq!(
            factory.create_message(NUM_TYPES as i64).unwrap_err(),
            MessageError::TypeOutOfRange {
                message_type: NUM_TYPES as u16,
                num_types: NUM_TYPES as u16
            }
        );
        assert_eq!(budget.allocations(), 0);
        assert_eq!(factory.error_level(), ErrorLevel::NoError);
    }

    #[test]
    fn exhaustion_sets_sticky_error_level() {
        let budget = Rc::new(BudgetAllocator::new(MESSAGE_FOOTPRINT));
        let mut factory = tracked(budget.clone());

        let held = factory.create_message(PING).unwrap().unwrap();
        assert_eq!(factory.error_level(), ErrorLevel::NoError);

        assert!(factory.create_message(PING).unwrap().is_none());
        assert_eq!(factory.error_level(), ErrorLevel::FailedToAllocate);
        assert!(factory.error_level().is_error());

        factory.release_message(held).unwrap();
        assert_eq!(factory.error_level(), ErrorLevel::FailedToAllocate);

        factory.clear_error_level();
        assert_eq!(factory.error_level(), ErrorLevel::NoError);

        let again = factory.create_message(PING).unwrap().unwrap();
        assert_eq!(factory.error_level(), ErrorLevel::NoError);
        factory.release_message(again).unwrap();
    }

    #[test]
    fn unregistered_type_reports_failure_and_frees_footprint() {
        let budget = Rc::new(BudgetAllocator::new(4096));
        let mut factory = tracked(budget.clone());

        assert!(factory.create_message(UNREGISTERED).unwrap().is_none());
        assert_eq!(factory.error_level(), ErrorLevel::FailedToAllocate);
        assert_eq!(budget.outstanding(), 0);
    }

    #[test]
    fn leak_report_lists_unreleased_messages() {
        let mut factory = tracked(Rc::new(HeapAllocator));
        let a = factory.create_message(PING).unwrap().unwrap();
        let b = factory.create_message(SNAPSHOT).unwrap().unwrap();
        let c = factory.create_message(SNAPSHOT).unwrap().unwrap();
        let leaked_key = c.key();

        factory.release_message(a).unwrap();
        factory.release_message(b).unwrap();
        drop(c);

        let report = factory.shutdown();
        assert!(report.tracked);
        assert_eq!(
            report.leaks,
            vec![LeakedMessage {
                key: leaked_key,
                message_type: MessageType::new(SNAPSHOT).unwrap(),
                ref_count: 1,
                is_block: true,
            }]
        );
    }

    #[test]
    #[should_panic(expected = "1 messages leaked")]
    fn strict_mode_panics_on_leak() {
        let mut factory = MessageFactory::with_config(
            Rc::new(HeapAllocator),
            registry(),
            FactoryConfig::with_leak_tracking(LeakTracking::Strict),
        );
        let leaked = factory.create_message(PING).unwrap().unwrap();
        std::mem::forget(leaked);
        drop(factory);
    }

    #[test]
    fn untracked_factory_reports_nothing() {
        let mut factory = MessageFactory::with_config(
            Rc::new(HeapAllocator),
            registry(),
            FactoryConfig::with_leak_tracking(LeakTracking::Off),
        );
        let _leaked = factory.create_message(PING).unwrap().unwrap();
        assert_eq!(factory.live_messages(), None);

        let report = factory.shutdown();
        assert!(!report.tracked);
        assert!(report.is_clean());
    }

    #[test]
    fn destroying_block_message_frees_block_through_its_allocator() {
        let factory_budget = Rc::new(BudgetAllocator::new(4096));
        let block_budget = Rc::new(BudgetAllocator::new(4096));
        let mut factory = tracked(factory_budget.clone());

        let message = factory.create_message(SNAPSHOT).unwrap().unwrap();
        assert!(message.is_block_message());
        message
            .attach_block(Block::copy_from(block_budget.clone(), &[7u8; 300]).unwrap())
            .unwrap();
        assert_eq!(message.block_size(), 300);

        let queued = factory.acquire_message(&message).unwrap().unwrap();
        factory.release_message(message).unwrap();
        assert_eq!(block_budget.frees(), 0);

        factory.release_message(queued).unwrap();
        assert_eq!(block_budget.frees(), 1);
        assert_eq!(block_budget.used(), 0);
        assert_eq!(factory_budget.outstanding(), 0);
    }

    #[test]
    fn detached_block_survives_destruction() {
        let block_budget = Rc::new(BudgetAllocator::new(4096));
        let mut factory = tracked(Rc::new(HeapAllocator));

        let message = factory.create_message(SNAPSHOT).unwrap().unwrap();
        message
            .attach_block(Block::copy_from(block_budget.clone(), b"level data").unwrap())
            .unwrap();
        let block = message.detach_block().unwrap();
        assert_eq!(message.block_size(), 0);

        factory.release_message(message).unwrap();
        assert_eq!(block_budget.frees(), 0);
        assert_eq!(block.data(), b"level data");

        drop(block);
        assert_eq!(block_budget.frees(), 1);
    }

    #[test]
    fn foreign_messages_are_rejected() {
        let mut ours = tracked(Rc::new(HeapAllocator));
        let mut theirs = tracked(Rc::new(HeapAllocator));

        let message = theirs.create_message(PING).unwrap().unwrap();
        let key = message.key();
        assert_eq!(
            ours.acquire_message(&message).unwrap_err(),
            MessageError::ForeignMessage(key)
        );
        assert_eq!(message.ref_count(), 1);

        theirs.release_message(message).unwrap();
        assert!(ours.shutdown().is_clean());
        assert!(theirs.shutdown().is_clean());
    }

    #[test]
    fn rejected_foreign_release_hands_the_message_back() {
        let budget = Rc::new(BudgetAllocator::new(4096));
        let mut owner = tracked(budget.clone());
        let mut other = tracked(Rc::new(HeapAllocator));

        let message = owner.create_message(PING).unwrap().unwrap();
        let key = message.key();
        let err = other.release_message(message).unwrap_err();
        assert_eq!(err.error, MessageError::ForeignMessage(key));
        assert_eq!(owner.live_messages(), Some(1));

        let message = err.into_message();
        assert_eq!(message.key(), key);
        assert_eq!(message.ref_count(), 1);
        assert_eq!(
            owner.release_message(message).unwrap(),
            ReleaseOutcome::Destroyed
        );
        assert_eq!(budget.outstanding(), 0);
        assert!(owner.shutdown().is_clean());
        assert!(other.shutdown().is_clean());
    }

    #[test]
    fn set_id_is_visible_through_every_handle() {
        let mut factory = tracked(Rc::new(HeapAllocator));
        let message = factory.create_message(PING).unwrap().unwrap();
        let queued = factory.acquire_message(&message).unwrap().unwrap();

        message.set_id(1234);
        assert_eq!(queued.id(), 1234);
        queued.payload_mut::<Ping>().unwrap().sequence = 77;
        assert_eq!(message.payload::<Ping>().unwrap().sequence, 77);

        factory.release_message(message).unwrap();
        factory.release_message(queued).unwrap();
    }
}
