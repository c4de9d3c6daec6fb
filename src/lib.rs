//! # poolvisor
//!
//! **Poolvisor** keeps named pools of long-lived worker processes alive.
//!
//! A pool is a fixed-capacity group of *slots* named `pool1..=poolN`. Each slot is
//! occupied by one worker. When a worker exits, its slot is reaped and a replacement is
//! started under the same name and index. Callers address workers by slot name, by
//! `(pool, index)` or by pid, and can write to them directly, to a random slot, or
//! through a per-pool work queue that hands one payload at a time to idle workers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        add_process_pools / get_by_* / write_by_* / reboot / set_process
//!                                    │
//!                                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  PoolManager (facade)                                             │
//! │  - Mutex<Registry>: pools, slots, capacity tables, dispatchers    │
//! │  - Bus (broadcast events)                                         │
//! │  - ExitSender (exit notifications)                                │
//! └──────┬─────────────────────────────┬──────────────────────────────┘
//!        │ WorkerFactory::spawn        │
//!        ▼                             ▼
//!  ┌────────────┐ ┌────────────┐   ┌──────────────────────────────────┐
//!  │  worker1   │ │  worker2   │   │ reactor (one task per manager)   │
//!  │ (process)  │ │ (process)  │   │  ├─ exits  → reap + respawn      │
//!  └─────┬──────┘ └─────┬──────┘   │  ├─ ticks  → dispatch 1 payload  │
//!        │ exit         │ ack      │  └─ acks   → slot idle again     │
//!        └──────────────┴─────────►└──────────────────────────────────┘
//!                                    │ publish(Event)
//!                                    ▼
//!                 Bus ──► subscriber_listener ──► SubscriberSet
//!                                                  ├─► LogWriter
//!                                                  └─► custom subscribers
//! ```
//!
//! ### Slot lifecycle
//! ```text
//! add_process_pools ──► factory.spawn(name, index, args) ──► Running
//!                                                             │ exit
//!                                                             ▼
//!                                  Exited ──► unregister ──► factory.spawn (same identity)
//!                                                             ├─ Ok  ─► Running
//!                                                             └─ Err ─► absent
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Pools**         | Register, look up, replace and reboot slots.                 | [`PoolManager`], [`SlotInfo`]               |
//! | **Workers**       | Plug in how workers are built and talked to.                 | [`Worker`], [`WorkerFactory`], [`WorkerFn`] |
//! | **Processes**     | Real OS child processes over stdin/stdout (unix).            | [`CommandFactory`], [`ProcessWorker`]       |
//! | **Tables**        | Fixed-size pid → index records, pluggable.                   | [`CapacityTable`], [`MemoryTable`]          |
//! | **Subscriber API**| Observe registry, supervision and dispatch events.           | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed registration and worker errors.                        | [`PoolError`], [`WorkerError`]              |
//! | **Configuration** | Manager defaults and per-pool options.                       | [`ManagerConfig`], [`PoolOptions`]          |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use poolvisor::{CommandFactory, ManagerConfig, PoolManager, PoolOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mgr = PoolManager::new(ManagerConfig::default());
//!
//!     // Each worker acknowledges every line it reads by echoing its own slot name.
//!     let echo = Arc::new(
//!         CommandFactory::new("sh")
//!             .arg("-c")
//!             .arg(r#"while read line; do echo "$POOL_SLOT_NAME"; done"#),
//!     );
//!
//!     mgr.add_process_pools("echo", echo, 3, PoolOptions::polling()).await?;
//!
//!     for job in ["a\n", "b\n", "c\n"] {
//!         mgr.write_by_polling("echo", job).await;
//!     }
//!     tokio::time::sleep(Duration::from_millis(200)).await;
//!     assert_eq!(mgr.queued("echo").await, Some(0));
//!
//!     // Terminate echo2; it is respawned under the same name.
//!     mgr.reboot("echo", 2).await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod subscribers;
mod table;
mod workers;

// ---- Public re-exports ----

pub use crate::core::{
    DEFAULT_TICK, ManagerConfig, PoolManager, PoolManagerBuilder, PoolOptions, SlotInfo, SlotKey,
    SlotState, TimerId,
};
pub use error::{PoolError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use subscribers::{Subscribe, SubscriberSet};
pub use table::{CapacityRow, CapacityTable, MemoryTable, TableFactory};
pub use workers::{
    ExitEvent, ExitSender, Signal, SpawnContext, Worker, WorkerFactory, WorkerFactoryRef,
    WorkerFn, WorkerRef,
};
#[cfg(unix)]
pub use workers::{CommandFactory, ProcessWorker, SLOT_INDEX_ENV, SLOT_NAME_ENV};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
