//! # PoolManager - public facade over the registry.
//!
//! Every call takes the registry lock for the duration of one synchronous operation.
//! Slow work never runs under it: `add_process_pools` plans under the lock, builds its
//! workers in a task of its own and locks again only to commit, and `read_by_name`
//! clones the worker handle, releases the lock and only then waits.
//!
//! ```text
//! add_process_pools ─┐
//! get_by_* / slot    │
//! set_process        ├──► Mutex<Registry> ◄── reactor (reap / respawned / tick / ack)
//! reboot             │
//! write_by_*         │
//! clear_timer / ...  ┘
//! ```
//!
//! Dropping the manager cancels the runtime token: the reactor, every timer and every
//! acknowledgement watcher stop, and workers are released with the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::core::builder::PoolManagerBuilder;
use crate::core::config::{ManagerConfig, PoolOptions};
use crate::core::registry::Registry;
use crate::core::slot::SlotInfo;
use crate::core::timer::TimerId;
use crate::error::{PoolError, WorkerError};
use crate::events::{Bus, Event};
use crate::workers::{ExitSender, WorkerFactoryRef, WorkerRef};

/// Manager of named worker pools.
///
/// # Example
/// ```rust
/// use poolvisor::{ManagerConfig, PoolManager, PoolOptions, WorkerError, WorkerFn, SpawnContext, WorkerRef};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let mgr = PoolManager::new(ManagerConfig::default());
///     let refuse = WorkerFn::arc(|ctx: SpawnContext| async move {
///         Err::<WorkerRef, _>(WorkerError::Rejected(ctx.name))
///     });
///
///     let err = mgr
///         .add_process_pools("worker", refuse, 2, PoolOptions::default())
///         .await
///         .unwrap_err();
///     assert_eq!(err.as_label(), "pool_construction_failure");
///     assert!(mgr.pools().await.is_empty());
/// }
/// ```
pub struct PoolManager {
    cfg: ManagerConfig,
    bus: Bus,
    registry: Arc<Mutex<Registry>>,
    exits: ExitSender,
    token: CancellationToken,
}

impl PoolManager {
    /// Returns a builder for a manager with subscribers or custom capacity tables.
    pub fn builder(cfg: ManagerConfig) -> PoolManagerBuilder {
        PoolManagerBuilder::new(cfg)
    }

    /// Creates a manager with default tables and no subscribers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: ManagerConfig) -> Self {
        PoolManagerBuilder::new(cfg).build()
    }

    pub(crate) fn from_parts(
        cfg: ManagerConfig,
        bus: Bus,
        registry: Arc<Mutex<Registry>>,
        exits: ExitSender,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry,
            exits,
            token,
        }
    }

    /// Registers `count` slots named `pool1..=poolN` and starts one worker per slot.
    ///
    /// Creates the pool on first use. With `options.polling` the pool gets a work queue
    /// and a dispatch timer (see [`write_by_polling`](Self::write_by_polling)).
    ///
    /// # Errors
    /// - [`PoolError::CapacityExceeded`]: live slots + `count` exceed the pool capacity
    /// - [`PoolError::DuplicateSlot`]: a composed name is already registered
    /// - [`PoolError::ConstructionFailure`]: the factory failed; workers already started
    ///   by this call are killed
    ///
    /// On error the registry is unchanged. The slot names stay reserved while the
    /// workers are being built, and construction finishes even if this future is dropped.
    pub async fn add_process_pools(
        &self,
        pool: &str,
        factory: WorkerFactoryRef,
        count: usize,
        options: PoolOptions,
    ) -> Result<(), PoolError> {
        let plan = self
            .registry
            .lock()
            .await
            .plan_pools(pool, count, &options)?;

        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            let built = plan.build(&factory).await;
            registry.lock().await.commit_pools(plan, factory, built)
        });
        match task.await {
            Ok(res) => res,
            Err(err) => Err(PoolError::ConstructionFailure {
                name: pool.to_string(),
                source: WorkerError::Aborted(err.to_string()),
            }),
        }
    }

    /// Worker occupying slot `index` of `pool`.
    pub async fn get_by_name(&self, pool: &str, index: u32) -> Option<WorkerRef> {
        let reg = self.registry.lock().await;
        reg.slot(pool, index).map(|s| s.worker.clone())
    }

    /// Snapshot of slot `index` of `pool`.
    pub async fn slot(&self, pool: &str, index: u32) -> Option<SlotInfo> {
        let reg = self.registry.lock().await;
        reg.slot(pool, index).map(|s| s.info())
    }

    /// Snapshots of every live slot of `pool`, ordered by index.
    pub async fn slots(&self, pool: &str) -> Vec<SlotInfo> {
        self.registry.lock().await.slot_infos(pool)
    }

    /// Worker with process id `pid`, resolved through the capacity tables.
    pub async fn get_by_pid(&self, pid: u32) -> Option<WorkerRef> {
        self.registry.lock().await.worker_by_pid(pid)
    }

    /// Replaces the worker handle of slot `name` and returns the previous one.
    ///
    /// Returns `None` if there is no such slot or its table refuses the new pid. The
    /// previous worker is not signalled and is no longer supervised: keep the returned
    /// handle to let it run (its exit is then reported as unknown) or drop it to release
    /// it. Dropping the last handle of a [`ProcessWorker`](crate::ProcessWorker) kills
    /// its child.
    pub async fn set_process(&self, name: &str, worker: WorkerRef) -> Option<WorkerRef> {
        self.registry.lock().await.set_process(name, worker)
    }

    /// Asks the worker in slot `index` of `pool` to terminate.
    ///
    /// Returns once the signal is sent; the replacement appears after the exit is reaped.
    pub async fn reboot(&self, pool: &str, index: u32) -> bool {
        self.registry.lock().await.reboot(pool, index)
    }

    /// Writes `data` to the worker of slot `name`.
    pub async fn write_by_name(&self, name: &str, data: &[u8]) -> bool {
        self.registry.lock().await.write_by_name(name, data)
    }

    /// Writes `data` to a uniformly random slot of `pool`. Returns the chosen slot name.
    pub async fn write_by_random(&self, pool: &str, data: &[u8]) -> Option<String> {
        self.registry.lock().await.write_by_random(pool, data)
    }

    /// Queues `data` for a polling pool.
    ///
    /// Returns `false` if the pool is unknown, not polling, or its queue is full.
    pub async fn write_by_polling(&self, pool: &str, data: impl Into<Vec<u8>>) -> bool {
        self.registry
            .lock()
            .await
            .write_by_polling(pool, data.into())
    }

    /// Reads one chunk from the worker of slot `name`, waiting at most `timeout`.
    ///
    /// On polling pools this competes with the acknowledgement watcher for output.
    pub async fn read_by_name(&self, name: &str, timeout: Duration) -> Option<Vec<u8>> {
        let worker = self.registry.lock().await.worker_by_name(name)?;
        worker.read(self.cfg.read_buffer, Some(timeout)).await
    }

    /// Id of the dispatch timer of `pool`, if it is running.
    pub async fn timer_id(&self, pool: &str) -> Option<TimerId> {
        self.registry.lock().await.timer_id(pool)
    }

    /// Stops dispatching for `pool`. Queued payloads stay queued.
    pub async fn clear_timer(&self, pool: &str) -> bool {
        self.registry.lock().await.clear_timer(pool)
    }

    /// Number of payloads waiting in the queue of a polling pool.
    pub async fn queued(&self, pool: &str) -> Option<usize> {
        self.registry.lock().await.queued(pool)
    }

    /// Number of idle slots of a polling pool.
    pub async fn idle_count(&self, pool: &str) -> Option<usize> {
        self.registry.lock().await.idle_count(pool)
    }

    /// Sorted pool names.
    pub async fn pools(&self) -> Vec<String> {
        self.registry.lock().await.pool_names()
    }

    /// Live slot names of `pool`, ordered by index.
    pub async fn slot_names(&self, pool: &str) -> Vec<String> {
        self.registry.lock().await.slot_names(pool)
    }

    /// Number of live slots of `pool`.
    pub async fn live_count(&self, pool: &str) -> usize {
        self.registry.lock().await.live_count(pool)
    }

    /// Slot capacity of `pool`, fixed when the pool was created.
    pub async fn capacity(&self, pool: &str) -> Option<usize> {
        self.registry.lock().await.capacity(pool)
    }

    /// Handle for reporting worker exits to this manager.
    pub fn exit_sender(&self) -> ExitSender {
        self.exits.clone()
    }

    /// Subscribes to the manager's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.cfg
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::Ack;
    use crate::core::key::SlotKey;
    use crate::events::EventKind;
    use crate::workers::testing::{FakeFactory, FakeWorker};
    use crate::workers::{SpawnContext, Worker};
    use crate::core::slot::SlotState;
    use std::collections::HashSet;
    use tokio::time::sleep;

    fn manager() -> PoolManager {
        PoolManager::new(ManagerConfig::default())
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        sleep(Duration::from_millis(5)).await;
    }

    fn kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind);
        }
        out
    }

    fn total_writes(factory: &FakeFactory) -> usize {
        factory.spawned().iter().map(|w| w.writes().len()).sum()
    }

    #[tokio::test]
    async fn registers_named_slots() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap();

        assert_eq!(mgr.slot_names("worker").await, ["worker1", "worker2", "worker3"]);
        assert_eq!(mgr.live_count("worker").await, 3);
        assert_eq!(mgr.capacity("worker").await, Some(256));
        assert_eq!(mgr.pools().await, ["worker"]);

        let w2 = factory.latest("worker2").unwrap();
        let got = mgr.get_by_name("worker", 2).await.unwrap();
        assert_eq!(got.pid(), w2.pid());
        assert_eq!(mgr.get_by_pid(w2.pid()).await.unwrap().pid(), w2.pid());

        let info = mgr.slot("worker", 2).await.unwrap();
        assert_eq!(info.name, "worker2");
        assert_eq!(info.state, SlotState::Running);
    }

    #[tokio::test]
    async fn crashed_worker_is_respawned_in_place() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap();
        let mut rx = mgr.subscribe();

        let old = factory.latest("worker2").unwrap();
        let old_pid = old.pid();
        old.crash();
        settle().await;

        let new = mgr.get_by_name("worker", 2).await.unwrap();
        assert_ne!(new.pid(), old_pid);
        assert!(mgr.get_by_pid(old_pid).await.is_none());
        assert_eq!(mgr.get_by_pid(new.pid()).await.unwrap().pid(), new.pid());
        assert_eq!(mgr.live_count("worker").await, 3);

        let seen = kinds(&mut rx);
        assert!(seen.contains(&EventKind::SlotExited));
        assert!(seen.contains(&EventKind::SlotRespawned));
    }

    #[tokio::test]
    async fn simultaneous_exits_are_all_respawned() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap();
        let before: HashSet<u32> = factory.spawned().iter().map(|w| w.pid()).collect();

        factory.latest("worker1").unwrap().crash();
        factory.latest("worker3").unwrap().crash();
        settle().await;

        let mut after = HashSet::new();
        for i in 1..=3 {
            after.insert(mgr.get_by_name("worker", i).await.unwrap().pid());
        }
        assert_eq!(before.intersection(&after).count(), 1);
        assert_eq!(factory.spawned().len(), 5);
    }

    #[tokio::test]
    async fn reboot_terminates_and_replaces() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 2, PoolOptions::default())
            .await
            .unwrap();
        let old_pid = mgr.get_by_name("worker", 1).await.unwrap().pid();

        assert!(mgr.reboot("worker", 1).await);
        settle().await;

        let new_pid = mgr.get_by_name("worker", 1).await.unwrap().pid();
        assert_ne!(old_pid, new_pid);
        assert!(!mgr.reboot("worker", 9).await);
        assert!(!mgr.reboot("nope", 1).await);
    }

    #[tokio::test]
    async fn failed_respawn_leaves_slot_absent() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap();
        let mut rx = mgr.subscribe();

        factory.fail(2);
        factory.latest("worker2").unwrap().crash();
        settle().await;

        assert!(mgr.get_by_name("worker", 2).await.is_none());
        assert_eq!(mgr.slot_names("worker").await, ["worker1", "worker3"]);
        assert!(!mgr.write_by_name("worker2", b"x").await);
        assert!(mgr.write_by_name("worker1", b"x").await);
        assert!(kinds(&mut rx).contains(&EventKind::RespawnFailed));
    }

    #[tokio::test]
    async fn capacity_is_enforced_before_anything_starts() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::default().with_capacity(2);
        mgr.add_process_pools("worker", factory.clone(), 2, opts)
            .await
            .unwrap();

        let err = mgr
            .add_process_pools("worker", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::CapacityExceeded { requested: 1, available: 0, .. }
        ));
        assert_eq!(mgr.live_count("worker").await, 2);
        assert_eq!(factory.spawned().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_names_reject_the_whole_call() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 2, PoolOptions::default())
            .await
            .unwrap();

        let err = mgr
            .add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::DuplicateSlot { ref name } if name == "worker1"));
        assert_eq!(mgr.live_count("worker").await, 2);
        assert_eq!(factory.spawned().len(), 2);
    }

    #[tokio::test]
    async fn composed_names_are_unique_across_pools() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("a1", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap();

        let err = mgr
            .add_process_pools("a", factory.clone(), 11, PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::DuplicateSlot { ref name } if name == "a11"));
        assert!(!mgr.pools().await.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn construction_failure_rolls_back_the_batch() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        factory.fail(2);

        let err = mgr
            .add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::ConstructionFailure { ref name, .. } if name == "worker2"));
        assert!(mgr.pools().await.is_empty());
        assert_eq!(mgr.live_count("worker").await, 0);

        let started = factory.spawned();
        assert_eq!(started.len(), 1);
        assert!(!started[0].write(b"x"), "started worker must be killed");

        factory.heal(2);
        mgr.add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap();
        assert_eq!(mgr.slot_names("worker").await, ["worker1", "worker2", "worker3"]);
    }

    #[tokio::test]
    async fn zero_count_creates_an_empty_pool() {
        let mgr = manager();
        mgr.add_process_pools("idle", FakeFactory::arc(), 0, PoolOptions::default())
            .await
            .unwrap();
        assert_eq!(mgr.pools().await, ["idle"]);
        assert_eq!(mgr.live_count("idle").await, 0);
        assert!(mgr.write_by_random("idle", b"x").await.is_none());
    }

    #[tokio::test]
    async fn args_reach_the_factory_on_respawn() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::default().with_args(["--mode", "fast"]);
        mgr.add_process_pools("worker", factory.clone(), 1, opts)
            .await
            .unwrap();

        factory.latest("worker1").unwrap().crash();
        settle().await;

        let seen = factory.seen_args();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|a| a == &["--mode", "fast"]));
    }

    #[tokio::test]
    async fn writes_reach_the_addressed_worker() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 2, PoolOptions::default())
            .await
            .unwrap();

        assert!(mgr.write_by_name("worker2", b"hello").await);
        assert!(!mgr.write_by_name("worker7", b"hello").await);
        assert_eq!(factory.latest("worker2").unwrap().writes(), [b"hello".to_vec()]);
        assert!(factory.latest("worker1").unwrap().writes().is_empty());
        assert!(mgr.get_by_pid(1).await.is_none());
    }

    #[tokio::test]
    async fn random_writes_spread_over_all_slots() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 3, PoolOptions::default())
            .await
            .unwrap();

        let mut chosen = HashSet::new();
        for _ in 0..300 {
            chosen.insert(mgr.write_by_random("worker", b"x").await.unwrap());
        }
        assert_eq!(chosen.len(), 3);
        assert_eq!(total_writes(&factory), 300);
        assert!(mgr.write_by_random("nope", b"x").await.is_none());
    }

    #[tokio::test]
    async fn read_by_name_times_out_or_returns_output() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap();

        let t = Duration::from_millis(20);
        assert!(mgr.read_by_name("worker1", t).await.is_none());

        factory.latest("worker1").unwrap().emit(b"pong");
        assert_eq!(mgr.read_by_name("worker1", t).await, Some(b"pong".to_vec()));
        assert!(mgr.read_by_name("worker9", t).await.is_none());
    }

    #[tokio::test]
    async fn set_process_swaps_handle_and_table_row() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 2, PoolOptions::default())
            .await
            .unwrap();
        let old_pid = mgr.get_by_name("worker", 2).await.unwrap().pid();

        let ctx = SpawnContext {
            name: "worker2".into(),
            index: 2,
            args: Arc::from(Vec::<String>::new()),
            exits: mgr.exit_sender(),
        };
        let replacement = FakeWorker::new(&ctx);
        let previous = mgr.set_process("worker2", replacement.clone()).await.unwrap();
        assert_eq!(previous.pid(), old_pid);
        assert!(mgr.set_process("worker9", replacement.clone()).await.is_none());

        assert_eq!(mgr.get_by_name("worker", 2).await.unwrap().pid(), replacement.pid());
        assert!(mgr.get_by_pid(old_pid).await.is_none());
        assert!(mgr.get_by_pid(replacement.pid()).await.is_some());

        // the replacement is supervised like any other worker
        replacement.crash();
        settle().await;
        let respawned = mgr.get_by_name("worker", 2).await.unwrap().pid();
        assert_ne!(respawned, replacement.pid());
    }

    #[tokio::test]
    async fn set_process_hands_back_the_unsupervised_worker() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap();
        let old = factory.latest("worker1").unwrap();

        let ctx = SpawnContext {
            name: "worker1".into(),
            index: 1,
            args: Arc::from(Vec::<String>::new()),
            exits: mgr.exit_sender(),
        };
        let replacement = FakeWorker::new(&ctx);
        let previous = mgr.set_process("worker1", replacement.clone()).await.unwrap();
        let mut rx = mgr.subscribe();

        // not signalled: still accepts input through the returned handle
        assert!(previous.write(b"still here"));
        assert_eq!(old.writes(), [b"still here".to_vec()]);

        old.crash();
        settle().await;
        assert_eq!(kinds(&mut rx), [EventKind::UnknownExit]);
        assert_eq!(mgr.get_by_name("worker", 1).await.unwrap().pid(), replacement.pid());
        assert_eq!(factory.spawned().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_respawn_does_not_block_other_slots() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 2, PoolOptions::default())
            .await
            .unwrap();

        factory.delay(2, Duration::from_millis(800));
        factory.latest("worker2").unwrap().crash();
        settle().await;

        let started = tokio::time::Instant::now();
        assert!(mgr.write_by_name("worker1", b"x").await);
        assert_eq!(mgr.slot_names("worker").await, ["worker1"]);
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(mgr.get_by_name("worker", 2).await.is_none());

        sleep(Duration::from_millis(800)).await;
        assert_eq!(mgr.slot_names("worker").await, ["worker1", "worker2"]);
        assert_eq!(mgr.live_count("worker").await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_construction_does_not_block_the_data_plane() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("fast", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap();
        factory.delay(1, Duration::from_millis(800));

        let slow = mgr.add_process_pools("slow", factory.clone(), 1, PoolOptions::default());
        tokio::pin!(slow);
        tokio::select! {
            _ = &mut slow => panic!("construction should still be running"),
            _ = sleep(Duration::from_millis(10)) => {}
        }

        let started = tokio::time::Instant::now();
        assert!(mgr.write_by_name("fast1", b"x").await);
        assert_eq!(mgr.pools().await, ["fast"]);
        assert!(started.elapsed() < Duration::from_millis(100));

        let err = mgr
            .add_process_pools("slow", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::DuplicateSlot { ref name } if name == "slow1"));

        slow.await.unwrap();
        assert_eq!(mgr.pools().await, ["fast", "slow"]);
        assert_eq!(mgr.slot_names("slow").await, ["slow1"]);
    }

    #[tokio::test]
    async fn unknown_exits_are_reported_and_ignored() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap();
        let mut rx = mgr.subscribe();

        assert!(mgr.exit_sender().notify(crate::ExitEvent::exited(4, 0)));
        settle().await;

        assert_eq!(kinds(&mut rx), [EventKind::UnknownExit]);
        assert_eq!(factory.spawned().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_dispatches_one_payload_per_tick() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::polling().with_tick(Duration::from_millis(50));
        mgr.add_process_pools("worker", factory.clone(), 2, opts)
            .await
            .unwrap();
        assert!(mgr.timer_id("worker").await.is_some());
        assert_eq!(mgr.idle_count("worker").await, Some(2));

        for i in 0..5u8 {
            assert!(mgr.write_by_polling("worker", vec![i]).await);
        }

        sleep(Duration::from_millis(60)).await;
        assert_eq!(total_writes(&factory), 1);
        assert_eq!(mgr.idle_count("worker").await, Some(1));
        assert_eq!(mgr.queued("worker").await, Some(4));

        sleep(Duration::from_millis(50)).await;
        assert_eq!(total_writes(&factory), 2);
        assert_eq!(mgr.idle_count("worker").await, Some(0));

        // no idle slot: payloads stay queued
        sleep(Duration::from_millis(200)).await;
        assert_eq!(total_writes(&factory), 2);
        assert_eq!(mgr.queued("worker").await, Some(3));

        let w1 = factory.latest("worker1").unwrap();
        w1.ack();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(total_writes(&factory), 3);
        assert_eq!(w1.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_ack_output_keeps_slot_busy() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::polling().with_tick(Duration::from_millis(50));
        mgr.add_process_pools("worker", factory.clone(), 1, opts)
            .await
            .unwrap();
        mgr.write_by_polling("worker", b"a".to_vec()).await;
        mgr.write_by_polling("worker", b"b".to_vec()).await;

        sleep(Duration::from_millis(60)).await;
        let w1 = factory.latest("worker1").unwrap();
        w1.emit(b"worker2");
        w1.emit(b"progress");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(w1.writes().len(), 1);

        w1.emit(b"worker1\n");
        sleep(Duration::from_millis(50)).await;
        assert_eq!(w1.writes(), [b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn respawned_polling_slot_starts_idle() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::polling().with_tick(Duration::from_millis(50));
        mgr.add_process_pools("worker", factory.clone(), 1, opts)
            .await
            .unwrap();
        mgr.write_by_polling("worker", b"a".to_vec()).await;
        mgr.write_by_polling("worker", b"b".to_vec()).await;

        sleep(Duration::from_millis(60)).await;
        assert_eq!(mgr.idle_count("worker").await, Some(0));

        factory.latest("worker1").unwrap().crash();
        sleep(Duration::from_millis(1)).await;
        assert_eq!(mgr.idle_count("worker").await, Some(1));

        sleep(Duration::from_millis(50)).await;
        let fresh = factory.latest("worker1").unwrap();
        assert_eq!(fresh.writes(), [b"b".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_acks_are_ignored() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::polling().with_tick(Duration::from_millis(50));
        mgr.add_process_pools("worker", factory.clone(), 1, opts)
            .await
            .unwrap();
        mgr.write_by_polling("worker", b"a".to_vec()).await;
        sleep(Duration::from_millis(60)).await;
        assert_eq!(mgr.idle_count("worker").await, Some(0));

        let mut rx = mgr.subscribe();
        let stale = Ack {
            key: SlotKey::new("worker", 1),
            pid: 1,
        };
        mgr.registry.lock().await.on_ack(stale);
        assert_eq!(mgr.idle_count("worker").await, Some(0));
        assert_eq!(kinds(&mut rx), [EventKind::StaleAck]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_timer_stops_dispatch() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        let opts = PoolOptions::polling().with_tick(Duration::from_millis(50));
        mgr.add_process_pools("worker", factory.clone(), 1, opts)
            .await
            .unwrap();

        assert!(mgr.clear_timer("worker").await);
        assert!(!mgr.clear_timer("worker").await);
        assert!(mgr.timer_id("worker").await.is_none());

        mgr.write_by_polling("worker", b"a".to_vec()).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(total_writes(&factory), 0);
        assert_eq!(mgr.queued("worker").await, Some(1));
    }

    #[tokio::test]
    async fn polling_write_rejections() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("plain", factory.clone(), 1, PoolOptions::default())
            .await
            .unwrap();
        let opts = PoolOptions::polling().with_queue_capacity(1);
        mgr.add_process_pools("poll", factory.clone(), 1, opts)
            .await
            .unwrap();
        let mut rx = mgr.subscribe();

        assert!(!mgr.write_by_polling("plain", b"x".to_vec()).await);
        assert!(!mgr.write_by_polling("missing", b"x".to_vec()).await);
        assert!(mgr.write_by_polling("poll", b"x".to_vec()).await);
        assert!(!mgr.write_by_polling("poll", b"y".to_vec()).await);

        let seen = kinds(&mut rx);
        assert!(seen.contains(&EventKind::QueueFull));
        assert!(seen.contains(&EventKind::LookupMiss));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_can_be_enabled_on_an_existing_pool() {
        let mgr = manager();
        let factory = FakeFactory::arc();
        mgr.add_process_pools("worker", factory.clone(), 0, PoolOptions::default())
            .await
            .unwrap();
        assert!(mgr.timer_id("worker").await.is_none());

        let opts = PoolOptions::polling().with_tick(Duration::from_millis(50));
        mgr.add_process_pools("worker", factory.clone(), 1, opts)
            .await
            .unwrap();
        assert!(mgr.timer_id("worker").await.is_some());
        assert_eq!(mgr.idle_count("worker").await, Some(1));
    }
}
