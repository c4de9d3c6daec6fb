//! # Reactor: the manager's single event loop.
//!
//! One task per manager serializes all asynchronous callbacks against the registry:
//!
//! ```text
//! exit channel ──► drain batch ──► Registry::reap
//! timer        ──► Tick(pool)  ──► Registry::on_tick
//! ack watcher  ──► Ack{key,pid}──► Registry::on_ack
//! respawn task ──► Respawned   ──► Registry::on_respawned
//! ```
//!
//! Every handler is synchronous: the lock is never held across a factory call.
//!
//! Exits take priority over dispatch so a dead worker is never picked for a payload
//! once its exit has been reported. The loop ends when the runtime token is cancelled.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::dispatch::Ack;
use crate::core::registry::Registry;
use crate::core::supervisor::Respawned;
use crate::workers::{ExitEvent, drain};

/// Internal messages delivered to the reactor.
pub(crate) enum ReactorMsg {
    /// Dispatch tick of a polling pool.
    Tick(Arc<str>),
    /// Idle acknowledgement read from a worker.
    Ack(Ack),
    /// A replacement worker finished building (or failed to).
    Respawned(Respawned),
}

pub(crate) fn spawn(
    registry: Arc<Mutex<Registry>>,
    mut exits: mpsc::UnboundedReceiver<ExitEvent>,
    mut msgs: mpsc::UnboundedReceiver<ReactorMsg>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(first) = exits.recv() => {
                    let batch = drain(first, &mut exits);
                    registry.lock().await.reap(batch);
                }
                Some(msg) = msgs.recv() => {
                    let mut reg = registry.lock().await;
                    match msg {
                        ReactorMsg::Tick(pool) => reg.on_tick(&pool),
                        ReactorMsg::Ack(ack) => reg.on_ack(ack),
                        ReactorMsg::Respawned(done) => reg.on_respawned(done),
                    }
                }
                else => break,
            }
        }
    })
}
