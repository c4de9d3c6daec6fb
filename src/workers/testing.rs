//! In-process fake workers for unit tests.
//!
//! `FakeWorker::kill` reports a synthetic exit through the slot's `ExitSender`, so the
//! whole reap/respawn path runs without real processes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WorkerError;
use crate::workers::exit::{ExitEvent, ExitSender};
use crate::workers::factory::{SpawnContext, WorkerFactory};
use crate::workers::worker::{Signal, Worker, WorkerRef};

static NEXT_PID: AtomicU32 = AtomicU32::new(10_000);

pub(crate) struct FakeWorker {
    pub name: String,
    pub index: u32,
    pid: u32,
    alive: AtomicBool,
    exits: ExitSender,
    writes: Mutex<Vec<Vec<u8>>>,
    out_tx: mpsc::UnboundedSender<Vec<u8>>,
    out_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl FakeWorker {
    pub fn new(ctx: &SpawnContext) -> Arc<Self> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: ctx.name.clone(),
            index: ctx.index,
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            alive: AtomicBool::new(true),
            exits: ctx.exits.clone(),
            writes: Mutex::new(Vec::new()),
            out_tx,
            out_rx: tokio::sync::Mutex::new(out_rx),
        })
    }

    /// Pushes bytes onto the worker's output channel.
    pub fn emit(&self, data: &[u8]) {
        let _ = self.out_tx.send(data.to_vec());
    }

    /// Emits the idle acknowledgement (the worker's own slot name).
    pub fn ack(&self) {
        self.emit(self.name.as_bytes());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Simulates an unexpected crash.
    pub fn crash(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.exits.notify(ExitEvent::signaled(self.pid, 9));
        }
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn write(&self, data: &[u8]) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        self.writes.lock().unwrap().push(data.to_vec());
        true
    }

    async fn read(&self, _max: usize, timeout: Option<Duration>) -> Option<Vec<u8>> {
        let mut rx = self.out_rx.lock().await;
        match timeout {
            Some(t) => tokio::time::timeout(t, rx.recv()).await.ok().flatten(),
            None => rx.recv().await,
        }
    }

    fn kill(&self, signal: Signal) -> bool {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return false;
        }
        let sig = match signal {
            Signal::Term => 15,
            Signal::Int => 2,
            Signal::Kill => 9,
        };
        self.exits.notify(ExitEvent::signaled(self.pid, sig))
    }
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    spawned: Mutex<Vec<Arc<FakeWorker>>>,
    failing: Mutex<HashSet<u32>>,
    delays: Mutex<HashMap<u32, Duration>>,
    seen_args: Mutex<Vec<Vec<String>>>,
}

impl FakeFactory {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every spawn for `index` fail until `heal` is called.
    pub fn fail(&self, index: u32) {
        self.failing.lock().unwrap().insert(index);
    }

    pub fn heal(&self, index: u32) {
        self.failing.lock().unwrap().remove(&index);
    }

    /// Makes every spawn for `index` take `by` before it completes.
    pub fn delay(&self, index: u32, by: Duration) {
        self.delays.lock().unwrap().insert(index, by);
    }

    pub fn spawned(&self) -> Vec<Arc<FakeWorker>> {
        self.spawned.lock().unwrap().clone()
    }

    /// Most recently spawned worker for `name`.
    pub fn latest(&self, name: &str) -> Option<Arc<FakeWorker>> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|w| w.name == name)
            .cloned()
    }

    pub fn seen_args(&self) -> Vec<Vec<String>> {
        self.seen_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerFactory for FakeFactory {
    async fn spawn(&self, ctx: SpawnContext) -> Result<WorkerRef, WorkerError> {
        let delay = self.delays.lock().unwrap().get(&ctx.index).copied();
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }
        if self.failing.lock().unwrap().contains(&ctx.index) {
            return Err(WorkerError::Rejected(format!("{} refused", ctx.name)));
        }
        self.seen_args.lock().unwrap().push(ctx.args.to_vec());
        let worker = FakeWorker::new(&ctx);
        self.spawned.lock().unwrap().push(worker.clone());
        Ok(worker)
    }
}
