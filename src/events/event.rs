//! # Runtime events emitted by the pool manager.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registry events**: pools and slots coming into existence
//! - **Supervision events**: exits, respawns, reboots
//! - **Dispatch events**: polling delivery, acknowledgements, misses
//! - **Subscriber events**: overflow and panics inside subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, pool and slot
//! names, pids and failure reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SlotRespawned)
//!     .with_pool("worker")
//!     .with_slot("worker2")
//!     .with_index(2)
//!     .with_pid(4242);
//!
//! assert_eq!(ev.kind, EventKind::SlotRespawned);
//! assert_eq!(ev.slot.as_deref(), Some("worker2"));
//! assert_eq!(ev.pid, Some(4242));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `slot`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `slot`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Registry events ===
    /// A batch of slots was registered by `add_process_pools`.
    ///
    /// Sets:
    /// - `pool`: pool name
    /// - `index`: number of slots added in this call
    PoolAdded,

    /// A slot's worker was started for the first time.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid`
    SlotStarted,

    /// A slot's worker handle was swapped via `set_process`.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid` (new pid)
    SlotReplaced,

    // === Supervision events ===
    /// A worker process exited and its slot was reaped.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid` (exited pid)
    /// - `code`: exit code (signal number is carried in `reason`)
    SlotExited,

    /// A reaped slot was recreated with the same identity.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid` (new pid)
    SlotRespawned,

    /// Recreating a reaped slot failed; the slot stays absent.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`
    /// - `reason`: factory error
    RespawnFailed,

    /// An exit was observed for a pid that no capacity table knows.
    ///
    /// Sets:
    /// - `pid`
    UnknownExit,

    /// `reboot` delivered a termination signal to a slot.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid`
    RebootRequested,

    // === Dispatch events ===
    /// The polling loop handed one payload to an idle slot.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid`
    /// - `reason`: `"write_failed"` if the worker refused the bytes
    PayloadDispatched,

    /// An idle acknowledgement was honored; the slot is selectable again.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid`
    SlotIdle,

    /// An acknowledgement from a replaced or unknown worker was ignored.
    ///
    /// Sets:
    /// - `pool`, `slot`, `index`, `pid` (pid that sent the ack)
    StaleAck,

    /// `write_by_polling` found the pool's queue full.
    ///
    /// Sets:
    /// - `pool`
    QueueFull,

    /// A data-plane operation addressed a slot or pool that does not exist.
    ///
    /// Sets:
    /// - `slot` (or `pool` for pool-level lookups)
    LookupMiss,

    /// A pool's dispatch timer was cancelled by `clear_timer`.
    ///
    /// Sets:
    /// - `pool`
    TimerCleared,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Pool name, if applicable.
    pub pool: Option<Arc<str>>,
    /// Composed slot name (or subscriber name for subscriber events).
    pub slot: Option<Arc<str>>,
    /// Slot index within its pool (or a count, see [`EventKind::PoolAdded`]).
    pub index: Option<u32>,
    /// Worker process id.
    pub pid: Option<u32>,
    /// Exit code of a reaped worker.
    pub code: Option<i32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pool: None,
            slot: None,
            index: None,
            pid: None,
            code: None,
            reason: None,
        }
    }

    /// Attaches a pool name.
    #[inline]
    pub fn with_pool(mut self, pool: impl Into<Arc<str>>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Attaches a composed slot name.
    #[inline]
    pub fn with_slot(mut self, slot: impl Into<Arc<str>>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Attaches a slot index.
    #[inline]
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_slot(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_slot(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
