//! Fault injection for the simulated counter bank.

use usbquad_core::RawCount;

/// A fault the simulated bank reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultScenario {
    /// Overwrite `channel` with `value` on every `every_n_scans`-th scan
    /// (scans `n, 2n, 3n, ...`). On a Z channel this produces a
    /// disagreement between the redundant pair.
    CorruptChannel {
        /// Flat channel offset within a scan
        channel: usize,
        /// Period in scans
        every_n_scans: u64,
        /// Value written instead of the encoder count
        value: RawCount,
    },
    /// `start_scan` fails.
    FailOnStart,
    /// Every snapshot after the first `count` fails.
    FailAfterSnapshots {
        /// Successful snapshots before failing
        count: u64,
    },
    /// The device stops on its own after writing `scans` scans.
    StopAfterScans {
        /// Scans written before the device stops
        scans: u64,
    },
    /// The device reports a write cursor that is not on a scan boundary,
    /// `offset` flat samples past the true cursor, on snapshot `snapshot`
    /// (counting from 1).
    MisalignCursor {
        /// Snapshot number that reports the shifted cursor
        snapshot: u64,
        /// Flat samples added to the cursor
        offset: usize,
    },
}

impl FaultScenario {
    /// Replacement value for `channel` at scan `scan`, if this fault corrupts it.
    pub fn corrupt(&self, scan: u64, channel: usize) -> Option<RawCount> {
        match *self {
            FaultScenario::CorruptChannel {
                channel: target,
                every_n_scans,
                value,
            } if target == channel
                && every_n_scans > 0
                && scan > 0
                && scan % every_n_scans == 0 =>
            {
                Some(value)
            }
            _ => None,
        }
    }
}
