//! Runtime core: registry, supervision and dispatch.
//!
//! The public API from this module is [`PoolManager`] (plus its builder and config).
//!
//! Internal modules:
//! - [`registry`]: owns pools, slots, capacity tables and timers;
//! - [`supervisor`]: reaps exits and respawns slots in place;
//! - [`dispatch`]: polling work queue, idle tracking, acknowledgement watchers;
//! - [`reactor`]: single event loop serializing exits, ticks and acks;
//! - [`timer`]: cancellable repeating timers.

mod builder;
mod config;
mod dispatch;
mod key;
mod manager;
mod queue;
mod reactor;
mod registry;
mod slot;
mod supervisor;
mod timer;

pub use builder::PoolManagerBuilder;
pub use config::{DEFAULT_TICK, ManagerConfig, PoolOptions};
pub use key::SlotKey;
pub use manager::PoolManager;
pub use slot::{SlotInfo, SlotState};
pub use timer::TimerId;
