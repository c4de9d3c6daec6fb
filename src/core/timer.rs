//! # Repeating timers.
//!
//! [`Timers`] schedules a callback every `interval` on its own tokio task and hands back a
//! [`TimerId`] for explicit cancellation. Each timer owns a child of the manager's runtime
//! token, so dropping the manager stops every timer.
//!
//! ## Rules
//! - The first callback fires one full `interval` after scheduling.
//! - Missed ticks are delayed, never bursted.
//! - A callback returning `false` ends its timer.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Registry of repeating timers.
pub(crate) struct Timers {
    next: u64,
    active: HashMap<TimerId, CancellationToken>,
    parent: CancellationToken,
}

impl Timers {
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            next: 1,
            active: HashMap::new(),
            parent,
        }
    }

    /// Calls `tick` every `interval` until it returns `false` or the timer is cancelled.
    pub fn schedule_repeating<F>(&mut self, interval: Duration, mut tick: F) -> TimerId
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let id = TimerId(self.next);
        self.next += 1;

        let token = self.parent.child_token();
        self.active.insert(id, token.clone());

        tokio::spawn(async move {
            let mut iv = time::interval_at(time::Instant::now() + interval, interval);
            iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = iv.tick() => {
                        if !tick() {
                            break;
                        }
                    }
                }
            }
        });
        id
    }

    /// Cancels a timer. Returns `false` if `id` is unknown or already cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.active.remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
