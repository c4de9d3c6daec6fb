//! # LogWriter: event renderer over `tracing`
//!
//! A minimal subscriber that renders incoming [`Event`]s as `tracing` records.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output
//! ```text
//! INFO poolvisor: pool added pool="worker" slots=3
//! INFO poolvisor: slot started slot="worker1" pid=4101
//! WARN poolvisor: slot exited slot="worker2" pid=4102 code=None reason=Some("signal 15")
//! INFO poolvisor: slot respawned slot="worker2" pid=4188
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let pool = e.pool.as_deref().unwrap_or("-");
        let slot = e.slot.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::PoolAdded => {
                info!(target: "poolvisor", pool, slots = ?e.index, "pool added");
            }
            EventKind::SlotStarted => {
                info!(target: "poolvisor", slot, pid = ?e.pid, "slot started");
            }
            EventKind::SlotReplaced => {
                info!(target: "poolvisor", slot, pid = ?e.pid, "slot replaced");
            }
            EventKind::SlotExited => {
                warn!(target: "poolvisor", slot, pid = ?e.pid, code = ?e.code, reason = ?e.reason, "slot exited");
            }
            EventKind::SlotRespawned => {
                info!(target: "poolvisor", slot, pid = ?e.pid, "slot respawned");
            }
            EventKind::RespawnFailed => {
                warn!(target: "poolvisor", slot, reason = ?e.reason, "respawn failed");
            }
            EventKind::UnknownExit => {
                debug!(target: "poolvisor", pid = ?e.pid, "exit from unknown pid");
            }
            EventKind::RebootRequested => {
                info!(target: "poolvisor", slot, pid = ?e.pid, "reboot requested");
            }
            EventKind::PayloadDispatched => {
                debug!(target: "poolvisor", slot, reason = ?e.reason, "payload dispatched");
            }
            EventKind::SlotIdle => {
                debug!(target: "poolvisor", slot, "slot idle");
            }
            EventKind::StaleAck => {
                debug!(target: "poolvisor", slot, pid = ?e.pid, "stale acknowledgement ignored");
            }
            EventKind::QueueFull => {
                warn!(target: "poolvisor", pool, "work queue full");
            }
            EventKind::LookupMiss => {
                debug!(target: "poolvisor", pool, slot, "lookup miss");
            }
            EventKind::TimerCleared => {
                info!(target: "poolvisor", pool, "dispatch timer cleared");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "poolvisor", subscriber = slot, reason = ?e.reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "poolvisor", subscriber = slot, reason = ?e.reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
