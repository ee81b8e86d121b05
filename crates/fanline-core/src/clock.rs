//! Monotone Score Clock
//!
//! Inbox rows are ordered by a worker-assigned score, not by the post's
//! publish time. The score must be strictly usable as an ordering key
//! within one fan-out pass, so the clock guarantees that consecutive
//! reads never go backwards even if the wall clock steps.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Issues non-decreasing nanosecond timestamps.
///
/// Each call returns `max(wall_clock_nanos, last + 1)`, so two calls from
/// the same clock never return the same value and never move backwards.
/// Safe to share across worker tasks.
#[derive(Debug, Default)]
pub struct ScoreClock {
    last: AtomicI64,
}

impl ScoreClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next score: current wall clock in nanoseconds, bumped past any
    /// previously issued value.
    pub fn next(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}
