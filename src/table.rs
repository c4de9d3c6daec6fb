//! # Capacity table: pid → slot index.
//!
//! Each pool owns one fixed-size [`CapacityTable`]. A row is written when a slot's worker
//! starts and deleted when that worker's exit is reaped, so after an exit the supervisor
//! can still recover *which* slot the dead pid occupied.
//!
//! ## Rules
//! - Exactly one row per live slot.
//! - The table never grows past its capacity; `set` on a full table fails.
//! - Rows are keyed by pid; re-setting an existing pid overwrites its index.
//!
//! [`MemoryTable`] is the in-process implementation. A table shared across processes
//! (shared memory, a file) plugs in through [`PoolManagerBuilder::with_tables`](crate::PoolManagerBuilder::with_tables).

use std::collections::HashMap;
use std::sync::Arc;

/// One row of a capacity table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityRow {
    /// Worker process id.
    pub pid: u32,
    /// Slot index the worker occupies.
    pub index: u32,
}

/// Fixed-size keyed record store.
pub trait CapacityTable: Send + Sync + 'static {
    /// Maximum number of rows.
    fn capacity(&self) -> usize;

    /// Inserts or overwrites the row for `row.pid`. Returns `false` if the table is full.
    fn set(&mut self, row: CapacityRow) -> bool;

    /// Returns the row for `pid`.
    fn get(&self, pid: u32) -> Option<CapacityRow>;

    /// Deletes the row for `pid`. Returns `false` if there was none.
    fn delete(&mut self, pid: u32) -> bool;

    /// Enumerates all rows (order unspecified).
    fn rows(&self) -> Vec<CapacityRow>;

    /// Number of rows currently stored.
    fn len(&self) -> usize {
        self.rows().len()
    }

    /// True if no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the table for a new pool from the pool's capacity.
pub type TableFactory = Arc<dyn Fn(usize) -> Box<dyn CapacityTable> + Send + Sync>;

/// In-memory capacity table.
#[derive(Debug, Default)]
pub struct MemoryTable {
    capacity: usize,
    rows: HashMap<u32, CapacityRow>,
}

impl MemoryTable {
    /// Creates an empty table holding at most `capacity` rows.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rows: HashMap::with_capacity(capacity),
        }
    }

    /// Default [`TableFactory`]: one [`MemoryTable`] per pool.
    pub fn factory() -> TableFactory {
        Arc::new(|capacity| Box::new(MemoryTable::new(capacity)) as Box<dyn CapacityTable>)
    }
}

impl CapacityTable for MemoryTable {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn set(&mut self, row: CapacityRow) -> bool {
        if !self.rows.contains_key(&row.pid) && self.rows.len() >= self.capacity {
            return false;
        }
        self.rows.insert(row.pid, row);
        true
    }

    fn get(&self, pid: u32) -> Option<CapacityRow> {
        self.rows.get(&pid).copied()
    }

    fn delete(&mut self, pid: u32) -> bool {
        self.rows.remove(&pid).is_some()
    }

    fn rows(&self) -> Vec<CapacityRow> {
        self.rows.values().copied().collect()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}
