//! Per-sample timestamp assignment.
//!
//! Timestamps are interpolated, not measured: each window spans
//! `start ..= start + (len - 1) * interval` and the next window starts one
//! interval after the previous end.

use usbquad_core::DeviceClock;

/// `len` evenly spaced timestamps from `start`, one `interval_us` apart.
///
/// Values are rounded to whole device time units.
pub fn timestamps(len: usize, start: f64, interval_us: f64) -> Vec<i64> {
    linspace(len, start, interval_us)
        .into_iter()
        .map(|t| t.round() as i64)
        .collect()
}

fn linspace(len: usize, start: f64, interval_us: f64) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let end = window_end(len, start, interval_us);
            let step = (end - start) / (len - 1) as f64;
            (0..len).map(|i| start + step * i as f64).collect()
        }
    }
}

fn window_end(len: usize, start: f64, interval_us: f64) -> f64 {
    start + len.saturating_sub(1) as f64 * interval_us
}

/// Carries the window start time between polls.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowTimestamper {
    next_start: f64,
    interval_us: f64,
}

impl WindowTimestamper {
    /// Timestamper whose first window starts at `start`.
    pub fn new(start: f64, interval_us: f64) -> Self {
        Self {
            next_start: start,
            interval_us,
        }
    }

    /// Timestamper whose first window starts one device time unit after
    /// the clock's current reading.
    pub fn from_clock(clock: &dyn DeviceClock, interval_us: f64) -> Self {
        Self::new(clock.now_us() as f64 + 1.0, interval_us)
    }

    /// Start time of the next window.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Interval between samples in microseconds.
    pub fn interval_us(&self) -> f64 {
        self.interval_us
    }

    /// Timestamps for the next `len` samples, without advancing.
    pub fn peek(&self, len: usize) -> Vec<i64> {
        timestamps(len, self.next_start, self.interval_us)
    }

    /// Timestamp the next `len` samples and advance past them.
    ///
    /// An empty window leaves the start time unchanged.
    pub fn stamp(&mut self, len: usize) -> Vec<i64> {
        let stamps = self.peek(len);
        self.advance(len);
        stamps
    }

    /// Advance past a window of `len` samples.
    pub fn advance(&mut self, len: usize) {
        if len > 0 {
            self.next_start = window_end(len, self.next_start, self.interval_us) + self.interval_us;
        }
    }
}
