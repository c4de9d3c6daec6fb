//! # Worker abstractions and factories.
//!
//! This module provides the worker-related types:
//! - [`Worker`] - trait for a running worker process
//! - [`WorkerRef`] - shared reference to a worker (`Arc<dyn Worker>`)
//! - [`WorkerFactory`], [`WorkerFn`] - how slots get their workers
//! - [`ExitEvent`], [`ExitSender`] - exit notifications feeding the respawn supervisor
//! - [`CommandFactory`], [`ProcessWorker`] - real OS child processes (unix)

mod exit;
mod factory;
#[cfg(unix)]
mod process;
#[cfg(test)]
pub(crate) mod testing;
mod worker;

pub(crate) use exit::drain;
pub use exit::{ExitEvent, ExitSender};
pub use factory::{SpawnContext, WorkerFactory, WorkerFactoryRef, WorkerFn};
#[cfg(unix)]
pub use process::{CommandFactory, ProcessWorker, SLOT_INDEX_ENV, SLOT_NAME_ENV};
pub use worker::{Signal, Worker, WorkerRef};
