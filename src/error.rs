//! Error types used by the pool manager and its workers.
//!
//! This module defines two main error enums:
//!
//! - [`PoolError`]: errors raised synchronously by [`PoolManager::add_process_pools`](crate::PoolManager::add_process_pools).
//! - [`WorkerError`]: errors raised while starting or talking to a single worker.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! Lookup misses and full queues are **not** errors: the data-plane operations report them
//! as `None`/`false` and publish an event instead.

use thiserror::Error;

/// # Errors produced by pool registration.
///
/// Every variant aborts the whole `add_process_pools` call; the registry is left exactly
/// as it was before the call.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has no room for the requested number of slots.
    #[error("pool '{pool}' cannot take {requested} more slot(s); {available} available")]
    CapacityExceeded {
        /// Pool name.
        pool: String,
        /// Number of slots the call asked for.
        requested: usize,
        /// Remaining capacity at the time of the call.
        available: usize,
    },

    /// A slot with the same composed name is already registered.
    #[error("slot '{name}' is already registered")]
    DuplicateSlot {
        /// Composed slot name (`pool + index`).
        name: String,
    },

    /// The worker factory failed to build a worker for one of the requested slots.
    #[error("failed to start worker '{name}': {source}")]
    ConstructionFailure {
        /// Composed slot name (`pool + index`).
        name: String,
        /// Underlying factory error.
        #[source]
        source: WorkerError,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::PoolError;
    ///
    /// let err = PoolError::DuplicateSlot { name: "worker1".into() };
    /// assert_eq!(err.as_label(), "pool_duplicate_slot");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::CapacityExceeded { .. } => "pool_capacity_exceeded",
            PoolError::DuplicateSlot { .. } => "pool_duplicate_slot",
            PoolError::ConstructionFailure { .. } => "pool_construction_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PoolError::CapacityExceeded {
                pool,
                requested,
                available,
            } => format!("capacity exceeded: pool={pool} requested={requested} available={available}"),
            PoolError::DuplicateSlot { name } => format!("duplicate slot: {name}"),
            PoolError::ConstructionFailure { name, source } => {
                format!("construction failure: slot={name} cause={}", source.as_message())
            }
        }
    }
}

/// # Errors produced by worker construction and I/O setup.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The operating system refused to start the process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A standard stream was not captured when the process was started.
    #[error("child {0} was not captured")]
    MissingPipe(&'static str),

    /// The process exited before its pid could be observed.
    #[error("child exited before its pid was known")]
    MissingPid,

    /// The factory refused to build the worker.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The factory did not run to completion (it panicked or its task was cancelled).
    #[error("aborted: {0}")]
    Aborted(String),
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::WorkerError;
    ///
    /// let err = WorkerError::Rejected("no binary".into());
    /// assert_eq!(err.as_label(), "worker_rejected");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Io(_) => "worker_io",
            WorkerError::MissingPipe(_) => "worker_missing_pipe",
            WorkerError::MissingPid => "worker_missing_pid",
            WorkerError::Rejected(_) => "worker_rejected",
            WorkerError::Aborted(_) => "worker_aborted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WorkerError::Io(e) => format!("io: {e}"),
            WorkerError::MissingPipe(which) => format!("missing pipe: {which}"),
            WorkerError::MissingPid => "missing pid".to_string(),
            WorkerError::Rejected(reason) => format!("rejected: {reason}"),
            WorkerError::Aborted(reason) => format!("aborted: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_message_names_the_pool() {
        let err = PoolError::CapacityExceeded {
            pool: "worker".into(),
            requested: 1,
            available: 0,
        };
        assert_eq!(err.as_label(), "pool_capacity_exceeded");
        assert!(err.to_string().contains("'worker'"));
        assert!(err.as_message().contains("available=0"));
    }

    #[test]
    fn construction_failure_keeps_source() {
        let err = PoolError::ConstructionFailure {
            name: "worker3".into(),
            source: WorkerError::MissingPipe("stdout"),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("child stdout was not captured"));
        assert!(err.as_message().contains("missing pipe: stdout"));
    }
}
