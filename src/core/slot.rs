use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::DropGuard;

use crate::core::key::SlotKey;
use crate::workers::{WorkerFactoryRef, WorkerRef};

/// Lifecycle state of a slot.
///
/// ```text
/// Starting ──► Running ──► Exited ──► (removed, respawn) ──► Starting ──► Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Worker built, registration in progress.
    Starting,
    /// Worker registered and addressable.
    Running,
    /// Worker exit reaped; the slot is about to be removed.
    Exited,
}

/// One occupied slot. Owned by its pool inside the registry.
pub(crate) struct WorkerSlot {
    pub key: SlotKey,
    pub name: String,
    pub worker: WorkerRef,
    pub pid: u32,
    pub state: SlotState,
    pub started_at: Instant,
    /// Factory and args this slot was created with; respawn re-uses them.
    pub factory: WorkerFactoryRef,
    pub args: Arc<[String]>,
    /// Stops the acknowledgement watcher when the slot is dropped.
    pub watch: Option<DropGuard>,
}

impl WorkerSlot {
    pub fn new(
        key: SlotKey,
        worker: WorkerRef,
        factory: WorkerFactoryRef,
        args: Arc<[String]>,
    ) -> Self {
        Self {
            name: key.name(),
            pid: worker.pid(),
            key,
            worker,
            state: SlotState::Starting,
            started_at: Instant::now(),
            factory,
            args,
            watch: None,
        }
    }

    pub fn info(&self) -> SlotInfo {
        SlotInfo {
            pool: self.key.pool.to_string(),
            index: self.key.index,
            name: self.name.clone(),
            pid: self.pid,
            state: self.state,
            started_at: self.started_at,
        }
    }
}

/// Read-only snapshot of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Pool name.
    pub pool: String,
    /// 1-based index within the pool.
    pub index: u32,
    /// Composed slot name.
    pub name: String,
    /// Pid of the worker currently occupying the slot.
    pub pid: u32,
    /// Lifecycle state.
    pub state: SlotState,
    /// When the current worker was registered.
    pub started_at: Instant,
}
