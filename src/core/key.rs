//! Slot identity.

use std::fmt;
use std::sync::Arc;

/// Identity of one slot: `(pool, index)`.
///
/// Maps are keyed by this composite, never by the composed name. The composed name
/// (`pool + index`, e.g. `worker2`) is what workers and callers see.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    /// Pool name.
    pub pool: Arc<str>,
    /// 1-based index within the pool.
    pub index: u32,
}

impl SlotKey {
    pub fn new(pool: impl Into<Arc<str>>, index: u32) -> Self {
        Self {
            pool: pool.into(),
            index,
        }
    }

    /// Composed slot name.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pool, self.index)
    }
}
