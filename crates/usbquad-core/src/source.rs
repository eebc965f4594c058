//! Hardware scan provider abstraction.
//!
//! A [`ScanSource`] owns a running hardware-paced counter scan that writes
//! interleaved samples into a fixed-capacity circular buffer. The engine
//! only ever sees [`ScanSnapshot`]s: the buffer contents together with the
//! hardware's current write cursor.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::RawCount;
use crate::error::Result;

/// Write cursor reported before the scan has produced its first sample.
pub const INDEX_NOT_STARTED: i64 = -1;

/// Hardware scan state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Configured but not started.
    #[default]
    Idle,
    /// Sampling into the circular buffer.
    Running,
    /// Stopped by the device or after an error.
    Stopped,
}

/// Point-in-time view of the circular scan buffer.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    /// Scan state at the time of the snapshot.
    pub status: ScanStatus,
    /// Flat index the hardware will write next, or [`INDEX_NOT_STARTED`].
    pub current_index: i64,
    /// Total samples transferred since the scan started, if the device reports it.
    pub total_count: Option<u64>,
    /// Entire circular buffer; its length is the capacity.
    pub buffer: Arc<[RawCount]>,
}

impl ScanSnapshot {
    /// Capacity of the circular buffer in flat samples.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the scan is still sampling.
    pub fn is_running(&self) -> bool {
        self.status == ScanStatus::Running
    }
}

/// Provider of hardware scan snapshots.
///
/// `stop_scan` is synchronous so that scoped guards can release the device
/// from `Drop` on every exit path.
#[async_trait]
pub trait ScanSource: Send + Sync {
    /// Number of interleaved channels per scan.
    fn channel_count(&self) -> usize;

    /// Start the hardware-paced scan.
    async fn start_scan(&self) -> Result<()>;

    /// Read the scan status, write cursor and buffer.
    async fn snapshot(&self) -> Result<ScanSnapshot>;

    /// Stop the scan and release the device. Must be idempotent.
    fn stop_scan(&self) -> Result<()>;
}

#[async_trait]
impl<S: ScanSource + ?Sized> ScanSource for Arc<S> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    async fn start_scan(&self) -> Result<()> {
        (**self).start_scan().await
    }

    async fn snapshot(&self) -> Result<ScanSnapshot> {
        (**self).snapshot().await
    }

    fn stop_scan(&self) -> Result<()> {
        (**self).stop_scan()
    }
}
