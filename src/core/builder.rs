use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::{config::ManagerConfig, manager::PoolManager, reactor, registry::Registry};
use crate::{
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
    table::{MemoryTable, TableFactory},
    workers::ExitSender,
};

/// Builder for constructing a [`PoolManager`] with optional features.
pub struct PoolManagerBuilder {
    cfg: ManagerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    tables: Option<TableFactory>,
}

impl PoolManagerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ManagerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            tables: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (slot starts, exits, respawns, dispatch)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets how each new pool's capacity table is built. Defaults to [`MemoryTable`].
    pub fn with_tables(mut self, tables: TableFactory) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Builds the manager and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> PoolManager {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();

        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(bus.subscribe(), subs, token.clone());
        }

        let (exits, exit_rx) = ExitSender::channel();
        let (signals, msg_rx) = mpsc::unbounded_channel();
        let tables = self.tables.unwrap_or_else(MemoryTable::factory);

        let registry = Arc::new(Mutex::new(Registry::new(
            self.cfg.clone(),
            bus.clone(),
            exits.clone(),
            signals,
            tables,
            token.clone(),
        )));
        reactor::spawn(Arc::clone(&registry), exit_rx, msg_rx, token.clone());

        PoolManager::from_parts(self.cfg, bus, registry, exits, token)
    }
}

/// Forwards bus events to the subscriber set until the runtime token is cancelled.
fn subscriber_listener(
    mut rx: broadcast::Receiver<crate::events::Event>,
    subs: SubscriberSet,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        subs.shutdown().await;
    });
}
