//! # Manager and pool configuration.
//!
//! Provides [`ManagerConfig`] (settings for one [`PoolManager`](crate::PoolManager)) and
//! [`PoolOptions`] (per-call settings of `add_process_pools`).
//!
//! `PoolOptions` fields left as `None` fall back to the manager config.
//!
//! ## Sentinel values
//! - `tick = 0s` → the default 50ms tick is used
//! - `read_buffer = 0` → reads are not size-limited
//! - capacities are clamped to at least 1

use std::sync::Arc;
use std::time::Duration;

/// Default dispatch tick of polling pools.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// Global configuration for one pool manager.
///
/// ## Field semantics
/// - `capacity`: default slot capacity of a new pool (size of its capacity table)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `tick`: default dispatch interval of polling pools (`0s` = [`DEFAULT_TICK`])
/// - `queue_capacity`: default bound of a polling pool's work queue (min 1)
/// - `read_buffer`: max bytes returned by one read (`0` = unlimited)
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Default number of slots a new pool may hold.
    pub capacity: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Default dispatch interval of polling pools.
    pub tick: Duration,

    /// Default number of payloads a polling pool's queue can hold.
    pub queue_capacity: usize,

    /// Maximum number of bytes returned by one read from a worker.
    pub read_buffer: usize,
}

impl ManagerConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the configured tick, or [`DEFAULT_TICK`] for `0s`.
    #[inline]
    pub fn tick_or_default(&self) -> Duration {
        if self.tick.is_zero() {
            DEFAULT_TICK
        } else {
            self.tick
        }
    }
}

impl Default for ManagerConfig {
    /// Default configuration:
    ///
    /// - `capacity = 256`
    /// - `bus_capacity = 1024`
    /// - `tick = 50ms`
    /// - `queue_capacity = 4096`
    /// - `read_buffer = 64 KiB`
    fn default() -> Self {
        Self {
            capacity: 256,
            bus_capacity: 1024,
            tick: DEFAULT_TICK,
            queue_capacity: 4096,
            read_buffer: 64 * 1024,
        }
    }
}

/// Options of one `add_process_pools` call.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use poolvisor::PoolOptions;
///
/// let opts = PoolOptions::polling()
///     .with_tick(Duration::from_millis(20))
///     .with_capacity(8)
///     .with_args(["--verbose"]);
/// assert!(opts.polling);
/// assert_eq!(opts.capacity, Some(8));
/// ```
#[derive(Clone, Debug, Default)]
pub struct PoolOptions {
    /// Enables the polling dispatch engine (work queue + timer + idle tracking).
    pub polling: bool,
    /// Dispatch interval; `None` uses [`ManagerConfig::tick`].
    pub tick: Option<Duration>,
    /// Work queue bound; `None` uses [`ManagerConfig::queue_capacity`].
    pub queue_capacity: Option<usize>,
    /// Slot capacity of a **new** pool; `None` uses [`ManagerConfig::capacity`].
    /// Ignored for existing pools: capacity is fixed at creation.
    pub capacity: Option<usize>,
    /// Extra arguments handed to the factory on every start and respawn.
    pub args: Vec<String>,
}

impl PoolOptions {
    /// Options with the polling dispatch engine enabled.
    pub fn polling() -> Self {
        Self {
            polling: true,
            ..Self::default()
        }
    }

    /// Sets the dispatch interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Sets the work queue bound.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the slot capacity of a new pool.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the factory arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn resolved_tick(&self, cfg: &ManagerConfig) -> Duration {
        match self.tick {
            Some(t) if !t.is_zero() => t,
            _ => cfg.tick_or_default(),
        }
    }

    pub(crate) fn resolved_queue_capacity(&self, cfg: &ManagerConfig) -> usize {
        self.queue_capacity.unwrap_or(cfg.queue_capacity).max(1)
    }

    pub(crate) fn resolved_capacity(&self, cfg: &ManagerConfig) -> usize {
        self.capacity.unwrap_or(cfg.capacity).max(1)
    }

    pub(crate) fn shared_args(&self) -> Arc<[String]> {
        self.args.clone().into()
    }
}
