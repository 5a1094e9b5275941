//! Local monotonic time sources.
//!
//! All scheduling happens in nanoseconds on the local monotonic clock,
//! counted from an epoch that precedes every deadline we arm.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// A source of local monotonic time in nanoseconds.
pub trait MonotonicClock: Send + Sync {
    /// Nanoseconds since this clock's epoch; never negative, never decreasing
    fn now_ns(&self) -> i64;
}

/// Monotonic clock counting from an `Instant` captured at construction.
///
/// Clones share the same epoch, so timestamps taken on the timer thread
/// and on the control loop are directly comparable.
#[derive(Clone, Debug)]
pub struct ProcessClock {
    epoch: Arc<Instant>,
}

impl ProcessClock {
    pub fn new() -> Self {
        Self {
            epoch: Arc::new(Instant::now()),
        }
    }
}

impl Default for ProcessClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for ProcessClock {
    fn now_ns(&self) -> i64 {
        // i64 nanoseconds last ~292 years of uptime
        i64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to, for deterministic simulation.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ns: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ns)),
        }
    }

    /// Move the clock to `t_ns`. Requests to move backward are ignored.
    pub fn set(&self, t_ns: i64) {
        self.now.fetch_max(t_ns, Ordering::AcqRel);
    }

    /// Move the clock forward by `dt_ns`.
    pub fn advance(&self, dt_ns: i64) {
        self.now.fetch_add(dt_ns.max(0), Ordering::AcqRel);
    }
}

impl MonotonicClock for ManualClock {
    fn now_ns(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
