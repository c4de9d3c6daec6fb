//! # Pool event subscribers.
//!
//! A [`Subscribe`] implementation watches what happens to pools and slots: registration
//! (`SlotStarted`, `PoolAdded`), supervision (`SlotExited`, `SlotRespawned`,
//! `RespawnFailed`) and polling dispatch (`PayloadDispatched`, `SlotIdle`, `QueueFull`).
//!
//! Subscribers never run on the reactor. Each one is fed from its own bounded queue by
//! its own task, so a subscriber that writes to a slow sink delays only itself, never a
//! respawn or a dispatch tick.
//!
//! ## Sizing the queue
//! A busy polling pool publishes one `PayloadDispatched` per tick and one `SlotIdle` per
//! acknowledgement, for every pool. A subscriber interested in dispatch traffic should
//! raise [`Subscribe::queue_capacity`]; one that only cares about exits and respawns can
//! keep the default. An overflowing queue drops the event for that subscriber alone and
//! publishes `EventKind::SubscriberOverflow`. A panic in `on_event` is caught and
//! published as `EventKind::SubscriberPanicked`.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use async_trait::async_trait;
//! use poolvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct DispatchCounter {
//!     dispatched: AtomicU64,
//!     failed_writes: AtomicU64,
//! }
//!
//! #[async_trait]
//! impl Subscribe for DispatchCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind != EventKind::PayloadDispatched {
//!             return;
//!         }
//!         self.dispatched.fetch_add(1, Ordering::Relaxed);
//!         if ev.reason.is_some() {
//!             self.failed_writes.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "dispatch" }
//!     fn queue_capacity(&self) -> usize { 8192 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of pool, slot and dispatch events.
///
/// `on_event` should not block the executor and should not panic; failures of the
/// subscriber's own sink are its own to handle.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event, in publication order for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Name carried by this subscriber's overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events that may wait for this subscriber (clamped to at least 1).
    ///
    /// Default: 1024, enough for supervision events. Raise it for dispatch traffic.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
