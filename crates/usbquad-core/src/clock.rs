//! Device time sources.
//!
//! Timestamps are expressed in device time units: microseconds since the
//! Unix epoch.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of "now" in device time units.
pub trait DeviceClock: Send + Sync {
    /// Current time in microseconds.
    fn now_us(&self) -> i64;
}

/// Wall clock in microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl DeviceClock for SystemClock {
    fn now_us(&self) -> i64 {
        Utc::now().timestamp_micros()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `start_us`.
    pub fn new(start_us: i64) -> Self {
        Self {
            now: AtomicI64::new(start_us),
        }
    }

    /// Set the current reading.
    pub fn set(&self, now_us: i64) {
        self.now.store(now_us, Ordering::SeqCst);
    }

    /// Advance the reading by `delta_us`.
    pub fn advance(&self, delta_us: i64) {
        self.now.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl DeviceClock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
