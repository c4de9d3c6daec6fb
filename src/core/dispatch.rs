//! # Polling dispatch engine.
//!
//! A polling pool owns a [`Dispatcher`]: a bounded [`WorkQueue`], the set of idle slot
//! indices, and the id of the timer driving it.
//!
//! ## Tick
//! ```text
//! timer ──► ReactorMsg::Tick(pool) ──► Registry::on_tick
//!             ├─ idle set empty  → nothing
//!             ├─ queue empty     → nothing
//!             └─ pick random idle slot, pop one payload, write it, mark slot busy
//! ```
//!
//! ## Acknowledgement
//! ```text
//! worker stdout == own slot name ──► watcher ──► ReactorMsg::Ack{key, pid} ──► Registry::on_ack
//!             ├─ slot gone or pid differs → StaleAck (ignored)
//!             └─ slot live                → back into the idle set
//! ```
//!
//! ## Rules
//! - At most one payload per tick per pool.
//! - The idle set only ever holds indices of live slots.

use std::collections::BTreeSet;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::trace;

use crate::core::key::SlotKey;
use crate::core::queue::WorkQueue;
use crate::core::reactor::ReactorMsg;
use crate::core::registry::Registry;
use crate::core::timer::TimerId;
use crate::events::{Event, EventKind};
use crate::workers::WorkerRef;

/// Idle acknowledgement from the worker occupying `key` with `pid`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Ack {
    pub key: SlotKey,
    pub pid: u32,
}

/// Per-pool dispatch state.
pub(crate) struct Dispatcher {
    idle: BTreeSet<u32>,
    queue: WorkQueue,
    pub timer: Option<TimerId>,
}

impl Dispatcher {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            idle: BTreeSet::new(),
            queue: WorkQueue::new(queue_capacity),
            timer: None,
        }
    }

    /// Adds a freshly started slot; new slots start idle.
    pub fn enroll(&mut self, index: u32) {
        self.idle.insert(index);
    }

    /// Drops any idle marker of a slot that is going away.
    pub fn forget(&mut self, index: u32) {
        self.idle.remove(&index);
    }

    /// Marks a slot idle again. Returns `false` if it already was.
    pub fn mark_idle(&mut self, index: u32) -> bool {
        self.idle.insert(index)
    }

    pub fn push(&self, data: Vec<u8>) -> bool {
        self.queue.push(data)
    }

    /// Picks a random idle slot and the oldest payload, marking the slot busy.
    pub fn next(&mut self) -> Option<(u32, Vec<u8>)> {
        if self.idle.is_empty() {
            return None;
        }
        let pick = rand::rng().random_range(0..self.idle.len());
        let index = *self.idle.iter().nth(pick)?;
        let data = self.queue.pop()?;
        self.idle.remove(&index);
        Some((index, data))
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    #[cfg(test)]
    pub fn is_idle(&self, index: u32) -> bool {
        self.idle.contains(&index)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Watches `worker`'s output for its idle acknowledgement.
///
/// The watcher stops when the returned guard is dropped, when `parent` is cancelled or
/// when the worker's output closes.
pub(crate) fn watch_acks(
    worker: WorkerRef,
    key: SlotKey,
    read_max: usize,
    tx: mpsc::UnboundedSender<ReactorMsg>,
    parent: &CancellationToken,
) -> DropGuard {
    let token = parent.child_token();
    let guard = token.clone().drop_guard();
    let name = key.name();
    let pid = worker.pid();
    tokio::spawn(async move {
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => break,
                chunk = worker.read(read_max, None) => chunk,
            };
            let Some(chunk) = chunk else { break };

            if chunk.trim_ascii() != name.as_bytes() {
                trace!(slot = %name, bytes = chunk.len(), "ignoring non-ack output");
                continue;
            }
            let ack = Ack {
                key: key.clone(),
                pid,
            };
            if tx.send(ReactorMsg::Ack(ack)).is_err() {
                break;
            }
        }
    });
    guard
}

impl Registry {
    /// One dispatch tick for `pool`.
    pub(crate) fn on_tick(&mut self, pool: &str) {
        let Some(p) = self.pools.get_mut(pool) else {
            return;
        };
        let Some(dispatch) = p.dispatch.as_mut() else {
            return;
        };
        let Some((index, data)) = dispatch.next() else {
            return;
        };
        let Some(slot) = p.slots.get(&index) else {
            return;
        };

        let mut ev = Event::new(EventKind::PayloadDispatched)
            .with_pool(slot.key.pool.clone())
            .with_slot(slot.name.as_str())
            .with_index(index)
            .with_pid(slot.pid);
        if !slot.worker.write(&data) {
            ev = ev.with_reason("write_failed");
        }
        self.bus.publish(ev);
    }

    /// Honors an idle acknowledgement if it comes from the slot's current worker.
    pub(crate) fn on_ack(&mut self, ack: Ack) {
        let Some(p) = self.pools.get_mut(&*ack.key.pool) else {
            return;
        };
        let live = p
            .slots
            .get(&ack.key.index)
            .is_some_and(|slot| slot.pid == ack.pid);

        let kind = match p.dispatch.as_mut() {
            Some(dispatch) if live => {
                dispatch.mark_idle(ack.key.index);
                EventKind::SlotIdle
            }
            _ => EventKind::StaleAck,
        };
        self.bus.publish(
            Event::new(kind)
                .with_pool(ack.key.pool.clone())
                .with_slot(ack.key.name())
                .with_index(ack.key.index)
                .with_pid(ack.pid),
        );
    }
}
