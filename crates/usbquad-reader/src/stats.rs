//! Acquisition statistics.
//!
//! Counters are plain atomics behind an `Arc` so other tasks can observe a
//! running loop without locking it.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use usbquad_core::{Axis, SinkDrops};

/// Live counters shared between the acquisition loop and its observers.
#[derive(Debug, Default)]
pub struct AcquisitionCounters {
    polls: AtomicU64,
    empty_polls: AtomicU64,
    windows: AtomicU64,
    samples: AtomicU64,
    records: AtomicU64,
    alignment_errors: AtomicU64,
    disagreements: AtomicU64,
    overruns: AtomicU64,
    samples_overwritten: AtomicU64,
    wraps_x: AtomicU64,
    wraps_y: AtomicU64,
    wraps_z: AtomicU64,
    zero_requests: AtomicU64,
    batches_dropped: AtomicU64,
    records_dropped: AtomicU64,
    interval_closes_dropped: AtomicU64,
}

/// Point-in-time copy of [`AcquisitionCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Poll cycles started
    pub polls: u64,
    /// Polls that found no new samples
    pub empty_polls: u64,
    /// Windows reconstructed and written
    pub windows: u64,
    /// Raw flat samples consumed
    pub samples: u64,
    /// Position records emitted
    pub records: u64,
    /// Cycles discarded because the window was misaligned
    pub alignment_errors: u64,
    /// Z samples replaced after channel disagreement
    pub disagreements: u64,
    /// Polls that found the buffer lapped before it was read
    pub overruns: u64,
    /// Samples lost to overruns
    pub samples_overwritten: u64,
    /// Wraparounds corrected on X
    pub wraps_x: u64,
    /// Wraparounds corrected on Y
    pub wraps_y: u64,
    /// Wraparounds corrected on Z
    pub wraps_z: u64,
    /// Zeroing commands applied
    pub zero_requests: u64,
    /// Record batches dropped by lossy sinks
    pub batches_dropped: u64,
    /// Records dropped by lossy sinks
    pub records_dropped: u64,
    /// End-of-interval markers a lossy sink could not deliver
    pub interval_closes_dropped: u64,
}

impl AcquisitionStats {
    /// Wraps corrected on one axis.
    pub fn wraps(&self, axis: Axis) -> u64 {
        match axis {
            Axis::X => self.wraps_x,
            Axis::Y => self.wraps_y,
            Axis::Z => self.wraps_z,
        }
    }
}

impl AcquisitionCounters {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_window(&self, samples: usize, records: usize) {
        self.windows.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(samples as u64, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_alignment_error(&self) {
        self.alignment_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disagreements(&self, count: u64) {
        self.disagreements.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self, lost: u64) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.samples_overwritten.fetch_add(lost, Ordering::Relaxed);
    }

    pub(crate) fn set_wraps(&self, axis: Axis, total: u64) {
        let counter = match axis {
            Axis::X => &self.wraps_x,
            Axis::Y => &self.wraps_y,
            Axis::Z => &self.wraps_z,
        };
        counter.store(total, Ordering::Relaxed);
    }

    pub(crate) fn record_zero_request(&self) {
        self.zero_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror the sink's running drop totals.
    pub(crate) fn set_drops(&self, drops: SinkDrops) {
        self.batches_dropped.store(drops.batches, Ordering::Relaxed);
        self.records_dropped.store(drops.records, Ordering::Relaxed);
        self.interval_closes_dropped
            .store(drops.interval_closes, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> AcquisitionStats {
        AcquisitionStats {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            windows: self.windows.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            alignment_errors: self.alignment_errors.load(Ordering::Relaxed),
            disagreements: self.disagreements.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            samples_overwritten: self.samples_overwritten.load(Ordering::Relaxed),
            wraps_x: self.wraps_x.load(Ordering::Relaxed),
            wraps_y: self.wraps_y.load(Ordering::Relaxed),
            wraps_z: self.wraps_z.load(Ordering::Relaxed),
            zero_requests: self.zero_requests.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            interval_closes_dropped: self.interval_closes_dropped.load(Ordering::Relaxed),
        }
    }
}
