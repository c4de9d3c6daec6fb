//! # Worker abstraction.
//!
//! A [`Worker`] is one long-lived process occupying a pool slot. The manager only needs
//! four capabilities from it: its pid, a non-blocking byte write into its input channel,
//! a bounded read from its output channel, and signal delivery.
//!
//! The common handle type is [`WorkerRef`], an `Arc<dyn Worker>` shared between the
//! registry, acknowledgement watchers and callers of `read_by_name`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Signals the manager may deliver to a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Polite termination request (`SIGTERM`). Used by `reboot`.
    Term,
    /// Interrupt (`SIGINT`).
    Int,
    /// Forced termination (`SIGKILL`). Used to discard half-built batches.
    Kill,
}

/// # A running worker process.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use poolvisor::{Signal, Worker};
///
/// struct Null { pid: u32 }
///
/// #[async_trait]
/// impl Worker for Null {
///     fn pid(&self) -> u32 { self.pid }
///     fn write(&self, _data: &[u8]) -> bool { true }
///     async fn read(&self, _max: usize, _timeout: Option<Duration>) -> Option<Vec<u8>> { None }
///     fn kill(&self, _signal: Signal) -> bool { false }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// OS process id of the worker.
    fn pid(&self) -> u32;

    /// Queues `data` for the worker's input channel without blocking.
    ///
    /// Returns `false` if the input channel is closed.
    fn write(&self, data: &[u8]) -> bool;

    /// Reads at most `max` bytes from the worker's output channel (`0` = no limit).
    ///
    /// Waits up to `timeout` (`None` = until data arrives or the channel closes).
    /// Returns `None` on timeout or once the output channel is closed.
    async fn read(&self, max: usize, timeout: Option<Duration>) -> Option<Vec<u8>>;

    /// Delivers `signal` to the worker process. Returns `false` if delivery failed.
    fn kill(&self, signal: Signal) -> bool;
}

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;
