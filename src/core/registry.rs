//! # Slot registry - the single owner of all pool state.
//!
//! The registry holds every pool, its capacity table, its slots and (for polling pools)
//! its dispatcher. It lives behind one `tokio::sync::Mutex` shared by the
//! [`PoolManager`](crate::PoolManager) facade and the reactor task, so control-plane
//! calls, exit reaping, ticks and acknowledgements never interleave.
//!
//! ## Architecture
//! ```text
//! PoolManager ──lock──┐
//!                     ▼
//!                 Registry
//!                   ├─ pools:  name ─► Pool { capacity, slots, table, dispatch }
//!                   ├─ names:  composed name ─► SlotKey
//!                   └─ timers: TimerId ─► timer task
//!                     ▲
//! reactor ──lock──────┘  (reap, on_tick, on_ack)
//! ```
//!
//! ## Registration
//! ```text
//! plan_pools   (locked)    capacity + table room, duplicates, reserve names
//! build        (unlocked)  factory.spawn per slot; first error kills the started ones
//! commit_pools (locked)    release names, register every slot or roll all of them back
//! ```
//!
//! ## Rules
//! - Registration is all-or-nothing: on any error nothing is registered.
//! - Capacity is checked before duplicates; construction runs last.
//! - No factory is awaited while the registry is locked.
//! - A slot is present in `slots`, `names` and its pool's `table` together, or in none.
//! - Composed names are unique across all pools, reserved ones included.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::{ManagerConfig, PoolOptions};
use crate::core::dispatch::{Dispatcher, watch_acks};
use crate::core::key::SlotKey;
use crate::core::reactor::ReactorMsg;
use crate::core::slot::{SlotInfo, SlotState, WorkerSlot};
use crate::core::timer::{TimerId, Timers};
use crate::error::{PoolError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::table::{CapacityRow, CapacityTable, TableFactory};
use crate::workers::{ExitSender, Signal, SpawnContext, WorkerFactoryRef, WorkerRef};

/// One named group of slots.
pub(crate) struct Pool {
    pub name: Arc<str>,
    pub capacity: usize,
    pub slots: BTreeMap<u32, WorkerSlot>,
    pub table: Box<dyn CapacityTable>,
    pub dispatch: Option<Dispatcher>,
}

impl Pool {
    fn new(name: Arc<str>, capacity: usize, table: Box<dyn CapacityTable>) -> Self {
        Self {
            name,
            capacity,
            slots: BTreeMap::new(),
            table,
            dispatch: None,
        }
    }
}

/// Free rows of a capacity table.
fn table_room(table: &dyn CapacityTable) -> usize {
    table.capacity().saturating_sub(table.len())
}

/// A validated registration whose workers are not built yet.
pub(crate) struct PoolPlan {
    name: Arc<str>,
    capacity: usize,
    /// Table of a pool that does not exist yet.
    table: Option<Box<dyn CapacityTable>>,
    keys: Vec<SlotKey>,
    args: Arc<[String]>,
    exits: ExitSender,
    opts: PoolOptions,
}

impl PoolPlan {
    /// Starts one worker per planned slot, in index order.
    ///
    /// On the first failure every worker started so far is killed.
    pub async fn build(&self, factory: &WorkerFactoryRef) -> Result<Vec<WorkerRef>, PoolError> {
        let mut started: Vec<WorkerRef> = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let ctx = SpawnContext {
                name: key.name(),
                index: key.index,
                args: self.args.clone(),
                exits: self.exits.clone(),
            };
            match guarded_spawn(factory, ctx).await {
                Ok(worker) => started.push(worker),
                Err(source) => {
                    warn!(
                        slot = %key,
                        started = started.len(),
                        error = %source,
                        "pool construction failed, killing started workers"
                    );
                    for worker in &started {
                        worker.kill(Signal::Kill);
                    }
                    return Err(PoolError::ConstructionFailure {
                        name: key.name(),
                        source,
                    });
                }
            }
        }
        Ok(started)
    }
}

/// Runs `factory.spawn`, turning a panic into [`WorkerError::Aborted`].
pub(crate) async fn guarded_spawn(
    factory: &WorkerFactoryRef,
    ctx: SpawnContext,
) -> Result<WorkerRef, WorkerError> {
    let name = ctx.name.clone();
    match AssertUnwindSafe(factory.spawn(ctx)).catch_unwind().await {
        Ok(res) => res,
        Err(_) => Err(WorkerError::Aborted(format!("factory panicked for {name}"))),
    }
}

/// Owner of every pool, slot, table and timer of one manager.
pub(crate) struct Registry {
    pub(super) cfg: ManagerConfig,
    pub(super) bus: Bus,
    pub(super) exits: ExitSender,
    pub(super) signals: mpsc::UnboundedSender<ReactorMsg>,
    pub(super) timers: Timers,
    pub(super) tables: TableFactory,
    pub(super) token: CancellationToken,
    pub(super) pools: HashMap<Arc<str>, Pool>,
    pub(super) names: HashMap<String, SlotKey>,
    /// Slot names whose worker is being built, outside the lock.
    pub(super) reserved: HashMap<String, SlotKey>,
}

impl Registry {
    pub fn new(
        cfg: ManagerConfig,
        bus: Bus,
        exits: ExitSender,
        signals: mpsc::UnboundedSender<ReactorMsg>,
        tables: TableFactory,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            exits,
            signals,
            timers: Timers::new(token.clone()),
            tables,
            token,
            pools: HashMap::new(),
            names: HashMap::new(),
            reserved: HashMap::new(),
        }
    }

    /// Validates a registration and reserves its slot names.
    ///
    /// Nothing is started here: the returned plan is built outside the registry lock
    /// and handed back to [`commit_pools`](Self::commit_pools).
    pub fn plan_pools(
        &mut self,
        pool: &str,
        count: usize,
        opts: &PoolOptions,
    ) -> Result<PoolPlan, PoolError> {
        let existing = self.pools.get(pool);
        let name: Arc<str> = existing.map_or_else(|| Arc::from(pool), |p| p.name.clone());
        let capacity = existing.map_or_else(|| opts.resolved_capacity(&self.cfg), |p| p.capacity);
        let table = match existing {
            Some(_) => None,
            None => Some((self.tables)(capacity)),
        };
        let room = existing.map_or_else(
            || table.as_ref().map_or(0, |t| table_room(t.as_ref())),
            |p| table_room(p.table.as_ref()),
        );
        let live = existing.map_or(0, |p| p.slots.len());
        let reserved = self.reserved_in(&name);

        let available = capacity
            .saturating_sub(live)
            .min(room)
            .saturating_sub(reserved);
        let count32 = u32::try_from(count).ok().filter(|_| count <= available);
        let Some(count32) = count32 else {
            return Err(PoolError::CapacityExceeded {
                pool: pool.to_string(),
                requested: count,
                available,
            });
        };

        let keys: Vec<SlotKey> = (1..=count32).map(|i| SlotKey::new(name.clone(), i)).collect();
        if let Some(dup) = keys.iter().map(SlotKey::name).find(|n| self.is_taken(n)) {
            return Err(PoolError::DuplicateSlot { name: dup });
        }
        for key in &keys {
            self.reserved.insert(key.name(), key.clone());
        }

        Ok(PoolPlan {
            name,
            capacity,
            table,
            keys,
            args: opts.shared_args(),
            exits: self.exits.clone(),
            opts: opts.clone(),
        })
    }

    /// Registers the workers built for `plan`, or rolls the whole batch back.
    ///
    /// Releases the plan's reservations in every case. A table shared with other pools
    /// may have filled up while the plan was being built; a refused row kills every
    /// worker of the batch and unregisters the slots already written.
    pub fn commit_pools(
        &mut self,
        plan: PoolPlan,
        factory: WorkerFactoryRef,
        built: Result<Vec<WorkerRef>, PoolError>,
    ) -> Result<(), PoolError> {
        for key in &plan.keys {
            self.reserved.remove(&key.name());
        }
        let workers = built?;
        let count = workers.len();
        let PoolPlan {
            name,
            capacity,
            table,
            keys,
            args,
            opts,
            ..
        } = plan;

        let created = !self.pools.contains_key(&name);
        if created {
            let table = table.unwrap_or_else(|| (self.tables)(capacity));
            self.pools
                .insert(name.clone(), Pool::new(name.clone(), capacity, table));
        }
        let polling = opts.polling || self.pools.get(&name).is_some_and(|p| p.dispatch.is_some());

        let mut registered = Vec::with_capacity(count);
        let mut refused = None;
        let mut pending = keys.into_iter().zip(workers);
        for (key, worker) in pending.by_ref() {
            let slot = self.occupy(&key, worker, factory.clone(), args.clone(), polling);
            match self.register(slot) {
                Ok(()) => registered.push(key),
                Err(slot) => {
                    slot.worker.kill(Signal::Kill);
                    refused = Some(key);
                    break;
                }
            }
        }

        if let Some(key) = refused {
            warn!(slot = %key, registered = registered.len(), "capacity table refused row, rolling back");
            for (_, worker) in pending {
                worker.kill(Signal::Kill);
            }
            for key in &registered {
                if let Some(slot) = self.unregister(key) {
                    slot.worker.kill(Signal::Kill);
                }
            }
            let available = self.pools.get(&name).map_or(0, |p| {
                capacity
                    .saturating_sub(p.slots.len())
                    .min(table_room(p.table.as_ref()))
            });
            if created {
                self.pools.remove(&name);
            }
            return Err(PoolError::CapacityExceeded {
                pool: name.to_string(),
                requested: count,
                available,
            });
        }

        for key in &registered {
            let pid = self.slot(&key.pool, key.index).map_or(0, |s| s.pid);
            self.bus.publish(
                Event::new(EventKind::SlotStarted)
                    .with_pool(name.clone())
                    .with_slot(key.name())
                    .with_index(key.index)
                    .with_pid(pid),
            );
        }
        if opts.polling {
            self.enable_dispatch(&name, &opts);
        }

        debug!(pool = %name, count, capacity, polling, "pool slots added");
        let added = u32::try_from(count).unwrap_or(u32::MAX);
        self.bus.publish(
            Event::new(EventKind::PoolAdded)
                .with_pool(name)
                .with_index(added),
        );
        Ok(())
    }

    /// Context handed to the factory for the slot at `key`.
    pub(super) fn spawn_context(&self, key: &SlotKey, args: Arc<[String]>) -> SpawnContext {
        SpawnContext {
            name: key.name(),
            index: key.index,
            args,
            exits: self.exits.clone(),
        }
    }

    /// Wraps a freshly built worker in a not-yet-registered slot.
    pub(super) fn occupy(
        &self,
        key: &SlotKey,
        worker: WorkerRef,
        factory: WorkerFactoryRef,
        args: Arc<[String]>,
        polling: bool,
    ) -> WorkerSlot {
        let mut slot = WorkerSlot::new(key.clone(), worker, factory, args);
        if polling {
            slot.watch = Some(watch_acks(
                slot.worker.clone(),
                key.clone(),
                self.cfg.read_buffer,
                self.signals.clone(),
                &self.token,
            ));
        }
        slot
    }

    /// Writes the slot into its pool's table, slot map, name index and idle set.
    ///
    /// Hands the slot back if the pool is missing, the index is occupied or the table
    /// refuses the row.
    pub(super) fn register(&mut self, mut slot: WorkerSlot) -> Result<(), WorkerSlot> {
        let Some(p) = self.pools.get_mut(&slot.key.pool) else {
            return Err(slot);
        };
        let index = slot.key.index;
        if p.slots.contains_key(&index) {
            return Err(slot);
        }
        if !p.table.set(CapacityRow {
            pid: slot.pid,
            index,
        }) {
            return Err(slot);
        }
        slot.state = SlotState::Running;
        if let Some(dispatch) = p.dispatch.as_mut() {
            dispatch.enroll(index);
        }
        self.names.insert(slot.name.clone(), slot.key.clone());
        p.slots.insert(index, slot);
        Ok(())
    }

    /// Holds a slot name while its worker is being built.
    pub(super) fn reserve(&mut self, key: &SlotKey) {
        self.reserved.insert(key.name(), key.clone());
    }

    pub(super) fn release(&mut self, key: &SlotKey) {
        self.reserved.remove(&key.name());
    }

    fn reserved_in(&self, pool: &str) -> usize {
        self.reserved.values().filter(|k| &*k.pool == pool).count()
    }

    fn is_taken(&self, name: &str) -> bool {
        self.names.contains_key(name) || self.reserved.contains_key(name)
    }

    /// Removes the slot at `key` from every index. The pool itself stays.
    pub(super) fn unregister(&mut self, key: &SlotKey) -> Option<WorkerSlot> {
        let p = self.pools.get_mut(&key.pool)?;
        let slot = p.slots.remove(&key.index)?;
        p.table.delete(slot.pid);
        if let Some(dispatch) = p.dispatch.as_mut() {
            dispatch.forget(key.index);
        }
        self.names.remove(&slot.name);
        Some(slot)
    }

    /// Turns on polling dispatch for an existing pool. No-op if already on.
    fn enable_dispatch(&mut self, pool: &Arc<str>, opts: &PoolOptions) {
        let tick = opts.resolved_tick(&self.cfg);
        let queue_capacity = opts.resolved_queue_capacity(&self.cfg);
        let read_max = self.cfg.read_buffer;

        let Some(p) = self.pools.get_mut(pool) else {
            return;
        };
        if p.dispatch.is_some() {
            return;
        }

        let mut dispatch = Dispatcher::new(queue_capacity);
        for slot in p.slots.values_mut() {
            dispatch.enroll(slot.key.index);
            if slot.watch.is_none() {
                slot.watch = Some(watch_acks(
                    slot.worker.clone(),
                    slot.key.clone(),
                    read_max,
                    self.signals.clone(),
                    &self.token,
                ));
            }
        }

        let tx = self.signals.clone();
        let name = pool.clone();
        dispatch.timer = Some(self.timers.schedule_repeating(tick, move || {
            tx.send(ReactorMsg::Tick(name.clone())).is_ok()
        }));
        p.dispatch = Some(dispatch);
    }

    fn miss(&self, what: &str) {
        self.bus
            .publish(Event::new(EventKind::LookupMiss).with_slot(what));
    }

    fn key_of(&self, name: &str) -> Option<&SlotKey> {
        let key = self.names.get(name);
        if key.is_none() {
            self.miss(name);
        }
        key
    }

    pub fn slot(&self, pool: &str, index: u32) -> Option<&WorkerSlot> {
        self.pools.get(pool)?.slots.get(&index)
    }

    pub fn slot_by_name(&self, name: &str) -> Option<&WorkerSlot> {
        let key = self.key_of(name)?;
        self.slot(&key.pool, key.index)
    }

    /// Resolves a pid through the capacity tables.
    pub fn worker_by_pid(&self, pid: u32) -> Option<WorkerRef> {
        self.pools.values().find_map(|p| {
            let row = p.table.get(pid)?;
            p.slots
                .get(&row.index)
                .filter(|slot| slot.pid == pid)
                .map(|slot| slot.worker.clone())
        })
    }

    /// Swaps the worker of an existing slot and hands back the previous one.
    ///
    /// The previous worker is not signalled and its pid leaves the table, so a later
    /// exit of it is reported as unknown.
    pub fn set_process(&mut self, name: &str, worker: WorkerRef) -> Option<WorkerRef> {
        let key = self.key_of(name).cloned()?;
        let read_max = self.cfg.read_buffer;
        let p = self.pools.get_mut(&key.pool)?;
        let slot = p.slots.get_mut(&key.index)?;

        let old_pid = slot.pid;
        let new_pid = worker.pid();
        p.table.delete(old_pid);
        if !p.table.set(CapacityRow {
            pid: new_pid,
            index: key.index,
        }) {
            p.table.set(CapacityRow {
                pid: old_pid,
                index: key.index,
            });
            return None;
        }

        let previous = std::mem::replace(&mut slot.worker, worker);
        slot.pid = new_pid;
        slot.state = SlotState::Running;
        slot.started_at = Instant::now();
        if p.dispatch.is_some() {
            slot.watch = Some(watch_acks(
                slot.worker.clone(),
                key.clone(),
                read_max,
                self.signals.clone(),
                &self.token,
            ));
        }

        debug!(slot = %key, old_pid, new_pid, "slot worker replaced");
        self.bus.publish(
            Event::new(EventKind::SlotReplaced)
                .with_pool(key.pool.clone())
                .with_slot(key.name())
                .with_index(key.index)
                .with_pid(new_pid),
        );
        Some(previous)
    }

    /// Sends `Term` to the slot's worker; the exit is reaped and respawned as usual.
    pub fn reboot(&self, pool: &str, index: u32) -> bool {
        let Some(slot) = self.slot(pool, index) else {
            self.miss(&format!("{pool}{index}"));
            return false;
        };
        let sent = slot.worker.kill(Signal::Term);
        let mut ev = Event::new(EventKind::RebootRequested)
            .with_pool(slot.key.pool.clone())
            .with_slot(slot.name.as_str())
            .with_index(index)
            .with_pid(slot.pid);
        if !sent {
            ev = ev.with_reason("signal_not_delivered");
        }
        self.bus.publish(ev);
        sent
    }

    pub fn write_by_name(&self, name: &str, data: &[u8]) -> bool {
        self.slot_by_name(name)
            .is_some_and(|slot| slot.worker.write(data))
    }

    /// Writes to a uniformly random slot of `pool`; returns the chosen name on success.
    pub fn write_by_random(&self, pool: &str, data: &[u8]) -> Option<String> {
        let Some(p) = self.pools.get(pool).filter(|p| !p.slots.is_empty()) else {
            self.miss(pool);
            return None;
        };
        let pick = rand::rng().random_range(0..p.slots.len());
        let slot = p.slots.values().nth(pick)?;
        slot.worker.write(data).then(|| slot.name.clone())
    }

    /// Queues a payload for the pool's dispatcher.
    pub fn write_by_polling(&self, pool: &str, data: Vec<u8>) -> bool {
        let Some(dispatch) = self.pools.get(pool).and_then(|p| p.dispatch.as_ref()) else {
            self.miss(pool);
            return false;
        };
        if dispatch.push(data) {
            return true;
        }
        self.bus
            .publish(Event::new(EventKind::QueueFull).with_pool(pool));
        false
    }

    pub fn worker_by_name(&self, name: &str) -> Option<WorkerRef> {
        self.slot_by_name(name).map(|slot| slot.worker.clone())
    }

    pub fn timer_id(&self, pool: &str) -> Option<TimerId> {
        self.pools.get(pool)?.dispatch.as_ref()?.timer
    }

    /// Cancels the pool's dispatch timer. Queued payloads stay queued.
    pub fn clear_timer(&mut self, pool: &str) -> bool {
        let Some(id) = self
            .pools
            .get_mut(pool)
            .and_then(|p| p.dispatch.as_mut())
            .and_then(|d| d.timer.take())
        else {
            return false;
        };
        let cancelled = self.timers.cancel(id);
        self.bus
            .publish(Event::new(EventKind::TimerCleared).with_pool(pool));
        cancelled
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.keys().map(|k| k.to_string()).collect();
        names.sort_unstable();
        names
    }

    pub fn slot_names(&self, pool: &str) -> Vec<String> {
        self.pools
            .get(pool)
            .map(|p| p.slots.values().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn slot_infos(&self, pool: &str) -> Vec<SlotInfo> {
        self.pools
            .get(pool)
            .map(|p| p.slots.values().map(WorkerSlot::info).collect())
            .unwrap_or_default()
    }

    pub fn live_count(&self, pool: &str) -> usize {
        self.pools.get(pool).map_or(0, |p| p.slots.len())
    }

    pub fn capacity(&self, pool: &str) -> Option<usize> {
        self.pools.get(pool).map(|p| p.capacity)
    }

    pub fn idle_count(&self, pool: &str) -> Option<usize> {
        Some(self.pools.get(pool)?.dispatch.as_ref()?.idle_count())
    }

    pub fn queued(&self, pool: &str) -> Option<usize> {
        Some(self.pools.get(pool)?.dispatch.as_ref()?.queued())
    }
}
