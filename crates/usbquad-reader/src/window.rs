//! Circular scan buffer window extraction.
//!
//! The hardware writes interleaved samples into a fixed-capacity circular
//! buffer and reports the flat index it will write next. Between two polls
//! the newly written samples are `[prev, cur)` in circular order:
//!
//! ```text
//!   prev < cur                      prev > cur (wrapped)
//!   ┌───────────────────────┐       ┌───────────────────────┐
//!   │     ████████          │       │█████          ████████│
//!   └─────▲───────▲─────────┘       └─────▲─────────▲───────┘
//!        prev    cur                     cur       prev
//! ```
//!
//! [`ScanCursor`] carries the read position between polls and only advances
//! once a window has been processed, so no sample is skipped or counted
//! twice.

use tracing::{trace, warn};

use usbquad_core::{RawCount, ScanSnapshot, INDEX_NOT_STARTED};

/// Extract the samples written since `prev_index`.
///
/// - `cur_index == -1`: the scan has not advanced yet; one zero sample per
///   channel is returned so the first poll still yields a record.
/// - `prev_index < cur_index`: `buffer[prev_index..cur_index]`.
/// - `prev_index > cur_index`: `buffer[prev_index..capacity] ++ buffer[..cur_index]`.
/// - `prev_index == cur_index`: empty, no new data.
///
/// Cursors beyond `capacity` (or beyond the buffer) are clamped.
pub fn extract(
    buffer: &[RawCount],
    capacity: usize,
    prev_index: usize,
    cur_index: i64,
    channel_count: usize,
) -> Vec<RawCount> {
    if cur_index == INDEX_NOT_STARTED {
        return vec![0; channel_count];
    }

    let capacity = capacity.min(buffer.len());
    let prev = prev_index.min(capacity);
    let cur = clamp_index(cur_index, capacity);

    if prev < cur {
        buffer[prev..cur].to_vec()
    } else if prev > cur {
        wrapped(buffer, capacity, prev, cur)
    } else {
        Vec::new()
    }
}

/// Concatenate `buffer[prev..capacity]` and `buffer[..cur]`.
///
/// With `prev == cur` this is one full lap of the buffer.
pub fn extract_wrapped(
    buffer: &[RawCount],
    capacity: usize,
    prev_index: usize,
    cur_index: usize,
) -> Vec<RawCount> {
    let capacity = capacity.min(buffer.len());
    wrapped(
        buffer,
        capacity,
        prev_index.min(capacity),
        cur_index.min(capacity),
    )
}

fn wrapped(buffer: &[RawCount], capacity: usize, prev: usize, cur: usize) -> Vec<RawCount> {
    let mut out = Vec::with_capacity(capacity - prev + cur);
    out.extend_from_slice(&buffer[prev..capacity]);
    out.extend_from_slice(&buffer[..cur]);
    out
}

fn clamp_index(index: i64, capacity: usize) -> usize {
    usize::try_from(index.max(0)).map_or(capacity, |i| i.min(capacity))
}

/// A window extracted from a snapshot, not yet committed to the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWindow {
    /// Interleaved raw samples in acquisition order.
    pub samples: Vec<RawCount>,
    /// Read position after this window, or `None` if the cursor must not move.
    pub next_index: Option<usize>,
    /// Hardware transfer count at the snapshot.
    pub total_count: Option<u64>,
    /// Samples overwritten before they could be read.
    pub overwritten: u64,
}

impl PendingWindow {
    /// Whether the window carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Read position in the circular scan buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    prev_index: usize,
    last_total: Option<u64>,
}

impl Default for ScanCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCursor {
    /// Cursor at the start of the buffer of a freshly started scan.
    pub fn new() -> Self {
        Self {
            prev_index: 0,
            last_total: Some(0),
        }
    }

    /// Flat index of the next unread sample.
    pub fn prev_index(&self) -> usize {
        self.prev_index
    }

    /// Extract the window of samples written since the last commit.
    ///
    /// When the device reports a transfer count, it disambiguates a full
    /// lap (`prev == cur` after exactly `capacity` samples) from an idle
    /// scan, and reveals overruns where unread samples were overwritten.
    pub fn pending(&self, snapshot: &ScanSnapshot, channel_count: usize) -> PendingWindow {
        let capacity = snapshot.capacity();

        if snapshot.current_index == INDEX_NOT_STARTED {
            trace!("Scan not advanced yet, emitting zero sample");
            return PendingWindow {
                samples: vec![0; channel_count],
                next_index: None,
                total_count: snapshot.total_count,
                overwritten: 0,
            };
        }

        let cur = clamp_index(snapshot.current_index, capacity);
        let written = match (snapshot.total_count, self.last_total) {
            (Some(total), Some(last)) => Some(total.saturating_sub(last)),
            _ => None,
        };

        let overwritten = match written {
            Some(written) if written > capacity as u64 => {
                let lost = written - capacity as u64;
                warn!(
                    written,
                    capacity,
                    lost,
                    "Scan buffer overrun: unread samples were overwritten"
                );
                lost
            }
            _ => 0,
        };

        let full_lap =
            capacity > 0 && self.prev_index == cur && written.is_some_and(|w| w >= capacity as u64);
        let samples = if full_lap {
            extract_wrapped(&snapshot.buffer, capacity, self.prev_index, cur)
        } else {
            extract(
                &snapshot.buffer,
                capacity,
                self.prev_index,
                snapshot.current_index,
                channel_count,
            )
        };

        PendingWindow {
            samples,
            next_index: Some(cur),
            total_count: snapshot.total_count,
            overwritten,
        }
    }

    /// Advance past a processed window.
    pub fn commit(&mut self, window: &PendingWindow) {
        if let Some(next) = window.next_index {
            self.prev_index = next;
        }
        if window.total_count.is_some() {
            self.last_total = window.total_count;
        }
    }
}
