//! Consumer side of the acquisition loop.

use async_trait::async_trait;
use serde::Serialize;

use crate::data::PositionRecord;
use crate::error::Result;

/// Running totals of what a sink discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkDrops {
    /// Record batches dropped
    pub batches: u64,
    /// Records inside the dropped batches
    pub records: u64,
    /// End-of-interval markers that could not be delivered
    pub interval_closes: u64,
}

/// Append-only consumer of position record batches.
///
/// Implementations must preserve record order. A sink that cannot keep up
/// must either block in [`write`](RecordSink::write) or drop batches and
/// report them through [`drops`](RecordSink::drops); silently losing records
/// is not allowed.
#[async_trait]
pub trait RecordSink: Send {
    /// Append one ordered batch of records.
    async fn write(&mut self, records: &[PositionRecord]) -> Result<()>;

    /// Close the current capture interval.
    ///
    /// Issued once when the acquisition loop exits, whatever the reason.
    /// Must not wait indefinitely on a sink that drops under pressure.
    async fn close_interval(&mut self) -> Result<()> {
        Ok(())
    }

    /// Totals dropped since the sink was created.
    fn drops(&self) -> SinkDrops {
        SinkDrops::default()
    }
}
