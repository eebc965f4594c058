//! Operational modes for the simulated counter bank.
//!
//! - **Instant**: every snapshot advances the scan by a fixed number of
//!   scans, independent of wall time. Deterministic, for unit tests.
//! - **Realistic**: scans follow the tokio clock at the configured sample
//!   rate. Works with paused time in tests.

/// How simulated time advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Fixed number of scans per snapshot
    #[default]
    Instant,
    /// Scans derived from elapsed tokio time
    Realistic,
}
