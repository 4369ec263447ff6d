//! Bounded boxed-value pool
//!
//! Boxed values are short-lived and numerous. Every one holds a token from
//! its registry's pool; exceeding the configured capacity is treated as a
//! runaway leak and terminates the process.

use std::cell::Cell;
use std::rc::Rc;

/// Pool usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Boxed values currently alive
    pub live: usize,
    /// Highest number alive at once
    pub peak: usize,
    /// Configured capacity
    pub capacity: usize,
}

pub(crate) struct BoxPool {
    capacity: usize,
    live: Cell<usize>,
    peak: Cell<usize>,
}

impl BoxPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            live: Cell::new(0),
            peak: Cell::new(0),
        }
    }

    /// Reserve a slot for one boxed value
    pub(crate) fn acquire(self: &Rc<Self>) -> PoolToken {
        let live = self.live.get();
        if live >= self.capacity {
            tracing::error!(capacity = self.capacity, "boxed value pool exhausted");
            std::process::abort();
        }
        self.live.set(live + 1);
        if live + 1 > self.peak.get() {
            self.peak.set(live + 1);
        }
        PoolToken { pool: Rc::clone(self) }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            live: self.live.get(),
            peak: self.peak.get(),
            capacity: self.capacity,
        }
    }
}

/// Slot held by a live boxed value, released on drop
pub(crate) struct PoolToken {
    pool: Rc<BoxPool>,
}

impl PoolToken {
    pub(crate) fn pool(&self) -> &Rc<BoxPool> {
        &self.pool
    }
}

impl Drop for PoolToken {
    fn drop(&mut self) {
        self.pool.live.set(self.pool.live.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_track_live_and_peak() {
        let pool = Rc::new(BoxPool::new(8));
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.stats().live, 2);
        drop(a);
        let stats = pool.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.peak, 2);
        assert_eq!(stats.capacity, 8);
        drop(b);
        assert_eq!(pool.stats().live, 0);
    }
}
