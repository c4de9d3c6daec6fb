//! # Exit supervision: reap and respawn.
//!
//! Every exit notification ends up here, in batches drained by the reactor.
//!
//! ```text
//! ExitEvent{pid} ──► find pool whose table has pid
//!                       ├─ none  → UnknownExit
//!                       └─ found → unregister slot (table row, name, idle marker)
//!                                  reserve the slot name, publish SlotExited
//!                                  spawn task: factory.spawn(same name, index, args)
//!                                       │
//!                   ReactorMsg::Respawned
//!                                       ▼
//!                  on_respawned ── release name
//!                                     ├─ Ok  → register, SlotRespawned
//!                                     └─ Err → RespawnFailed, slot stays absent
//! ```
//!
//! The factory runs in its own task, so a slow replacement never holds the registry
//! lock. Respawn is immediate; a worker that keeps dying is restarted every time its
//! exit is reaped.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::key::SlotKey;
use crate::core::reactor::ReactorMsg;
use crate::core::registry::{Registry, guarded_spawn};
use crate::core::slot::SlotState;
use crate::error::WorkerError;
use crate::events::{Event, EventKind};
use crate::workers::{ExitEvent, Signal, WorkerFactoryRef, WorkerRef};

/// A reaped slot waiting for its replacement worker.
pub(crate) struct Respawn {
    pub key: SlotKey,
    pub factory: WorkerFactoryRef,
    pub args: Arc<[String]>,
}

/// Outcome of one replacement build, delivered back to the reactor.
pub(crate) struct Respawned {
    pub job: Respawn,
    pub result: Result<WorkerRef, WorkerError>,
}

impl Registry {
    /// Reaps every exit of `batch`, in order, and starts each replacement.
    pub(crate) fn reap(&mut self, batch: Vec<ExitEvent>) {
        for ev in batch {
            if let Some(job) = self.reap_one(ev) {
                self.respawn(job);
            }
        }
    }

    fn reap_one(&mut self, ev: ExitEvent) -> Option<Respawn> {
        let found = self.pools.iter().find_map(|(name, p)| {
            p.table
                .get(ev.pid)
                .map(|row| SlotKey::new(name.clone(), row.index))
        });
        let Some(key) = found else {
            debug!(pid = ev.pid, status = %ev.describe(), "exit of unknown pid ignored");
            self.bus.publish(
                Event::new(EventKind::UnknownExit)
                    .with_pid(ev.pid)
                    .with_reason(ev.describe()),
            );
            return None;
        };

        if self.slot(&key.pool, key.index).map(|s| s.pid) != Some(ev.pid) {
            // row outlived its slot
            if let Some(p) = self.pools.get_mut(&key.pool) {
                p.table.delete(ev.pid);
            }
            return None;
        }
        let mut dead = self.unregister(&key)?;
        dead.state = SlotState::Exited;
        self.reserve(&key);

        let mut exited = Event::new(EventKind::SlotExited)
            .with_pool(key.pool.clone())
            .with_slot(key.name())
            .with_index(key.index)
            .with_pid(ev.pid)
            .with_reason(ev.describe());
        if let Some(code) = ev.code {
            exited = exited.with_code(code);
        }
        self.bus.publish(exited);

        Some(Respawn {
            key,
            factory: dead.factory.clone(),
            args: dead.args.clone(),
        })
    }

    /// Builds the replacement off the lock; the result comes back as a reactor message.
    fn respawn(&self, job: Respawn) {
        let ctx = self.spawn_context(&job.key, job.args.clone());
        let tx = self.signals.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                res = guarded_spawn(&job.factory, ctx) => res,
            };
            // a closed reactor drops the worker with the message
            let _ = tx.send(ReactorMsg::Respawned(Respawned { job, result }));
        });
    }

    /// Registers a replacement worker, or records why there is none.
    pub(crate) fn on_respawned(&mut self, done: Respawned) {
        let Respawned { job, result } = done;
        let key = job.key;
        self.release(&key);

        let worker = match result {
            Ok(worker) => worker,
            Err(err) => return self.respawn_failed(&key, err.to_string()),
        };
        let polling = self
            .pools
            .get(&key.pool)
            .is_some_and(|p| p.dispatch.is_some());
        let slot = self.occupy(&key, worker, job.factory, job.args, polling);
        let pid = slot.pid;
        match self.register(slot) {
            Ok(()) => {
                debug!(slot = %key, pid, "slot respawned");
                self.bus.publish(
                    Event::new(EventKind::SlotRespawned)
                        .with_pool(key.pool.clone())
                        .with_slot(key.name())
                        .with_index(key.index)
                        .with_pid(pid),
                );
            }
            Err(slot) => {
                slot.worker.kill(Signal::Kill);
                self.respawn_failed(&key, "capacity table full".to_string());
            }
        }
    }

    fn respawn_failed(&self, key: &SlotKey, reason: String) {
        warn!(slot = %key, error = %reason, "respawn failed, slot left empty");
        self.bus.publish(
            Event::new(EventKind::RespawnFailed)
                .with_pool(key.pool.clone())
                .with_slot(key.name())
                .with_index(key.index)
                .with_reason(reason),
        );
    }
}
