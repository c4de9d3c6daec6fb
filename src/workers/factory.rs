//! # Worker factories.
//!
//! A [`WorkerFactory`] builds the worker for one slot. It is called once per slot by
//! `add_process_pools` and again by the respawn supervisor every time that slot's
//! worker exits, always with the same [`SpawnContext::name`] and [`SpawnContext::index`].
//!
//! [`WorkerFn`] wraps a closure `F: Fn(SpawnContext) -> Fut`, producing a fresh
//! future per spawn.
//!
//! ## Example
//! ```rust
//! use poolvisor::{SpawnContext, WorkerError, WorkerFn, WorkerFactoryRef};
//!
//! let factory: WorkerFactoryRef = WorkerFn::arc(|ctx: SpawnContext| async move {
//!     Err::<poolvisor::WorkerRef, _>(WorkerError::Rejected(format!("{} disabled", ctx.name)))
//! });
//! # let _ = factory;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::workers::exit::ExitSender;
use crate::workers::worker::WorkerRef;

/// Everything a factory needs to start the worker for one slot.
#[derive(Clone, Debug)]
pub struct SpawnContext {
    /// Composed slot name (`pool + index`), stable across respawns.
    pub name: String,
    /// 1-based slot index within the pool, stable across respawns.
    pub index: u32,
    /// Extra arguments given in [`PoolOptions::args`](crate::PoolOptions::args).
    pub args: Arc<[String]>,
    /// Where the worker reports its own exit.
    pub exits: ExitSender,
}

/// Builds workers for pool slots.
#[async_trait]
pub trait WorkerFactory: Send + Sync + 'static {
    /// Starts one worker for the slot described by `ctx`.
    async fn spawn(&self, ctx: SpawnContext) -> Result<WorkerRef, WorkerError>;
}

/// Shared handle to a factory.
pub type WorkerFactoryRef = Arc<dyn WorkerFactory>;

/// Function-backed factory.
#[derive(Debug)]
pub struct WorkerFn<F> {
    f: F,
}

impl<F> WorkerFn<F> {
    /// Creates a new function-backed factory.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the factory and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> WorkerFactory for WorkerFn<F>
where
    F: Fn(SpawnContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkerRef, WorkerError>> + Send + 'static,
{
    async fn spawn(&self, ctx: SpawnContext) -> Result<WorkerRef, WorkerError> {
        (self.f)(ctx).await
    }
}
