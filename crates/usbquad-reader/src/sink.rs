//! Record sinks.
//!
//! [`ChannelSink`] forwards record batches to another task over a bounded
//! `mpsc` channel. When the consumer falls behind it either waits for room
//! ([`SinkMode::Blocking`]) or drops the batch and counts it
//! ([`SinkMode::Lossy`]). [`MemorySink`] keeps everything in memory.
//!
//! A lossy sink never waits, not even to deliver
//! [`SinkMessage::IntervalClosed`]. If that marker is dropped the consumer
//! sees the end of the interval as the channel closing.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use usbquad_core::{PositionRecord, ReaderError, RecordSink, Result, SinkDrops};

/// Default channel depth in batches.
pub const DEFAULT_SINK_BUFFER: usize = 64;

/// One window worth of records.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionBatch {
    /// Monotonic batch number, counting dropped batches too.
    pub sequence: u64,
    /// Records in acquisition order.
    pub records: Vec<PositionRecord>,
}

/// Item delivered to the consumer of a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    /// A batch of records.
    Batch(PositionBatch),
    /// The capture interval ended; no batches follow.
    IntervalClosed,
}

/// Receiving side of a [`ChannelSink`].
pub type SinkReceiver = mpsc::Receiver<SinkMessage>;

/// What to do when the consumer is not keeping up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// Wait for channel capacity.
    #[default]
    Blocking,
    /// Drop the batch and count it.
    Lossy,
}

/// Sink forwarding batches over a bounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<SinkMessage>,
    mode: SinkMode,
    sequence: u64,
    drops: SinkDrops,
}

impl ChannelSink {
    /// Create a sink and its receiver.
    pub fn new(
        name: impl Into<String>,
        buffer_size: usize,
        mode: SinkMode,
    ) -> (Self, SinkReceiver) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let sink = Self {
            name: name.into(),
            sender,
            mode,
            sequence: 0,
            drops: SinkDrops::default(),
        };
        (sink, receiver)
    }

    /// Sink name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backpressure mode.
    pub fn mode(&self) -> SinkMode {
        self.mode
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn write(&mut self, records: &[PositionRecord]) -> Result<()> {
        let batch = PositionBatch {
            sequence: self.sequence,
            records: records.to_vec(),
        };
        self.sequence += 1;

        match self.mode {
            SinkMode::Blocking => self
                .sender
                .send(SinkMessage::Batch(batch))
                .await
                .map_err(|_| ReaderError::SinkClosed),
            SinkMode::Lossy => match self.sender.try_send(SinkMessage::Batch(batch)) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.drops.batches += 1;
                    self.drops.records += records.len() as u64;
                    warn!(
                        sink = %self.name,
                        records = records.len(),
                        batches_dropped = self.drops.batches,
                        records_dropped = self.drops.records,
                        "Dropped batch (sink full)"
                    );
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ReaderError::SinkClosed),
            },
        }
    }

    async fn close_interval(&mut self) -> Result<()> {
        debug!(sink = %self.name, batches = self.sequence, "Closing capture interval");
        match self.mode {
            SinkMode::Blocking => self
                .sender
                .send(SinkMessage::IntervalClosed)
                .await
                .map_err(|_| ReaderError::SinkClosed),
            SinkMode::Lossy => match self.sender.try_send(SinkMessage::IntervalClosed) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.drops.interval_closes += 1;
                    warn!(sink = %self.name, "Dropped interval close marker (sink full)");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ReaderError::SinkClosed),
            },
        }
    }

    fn drops(&self) -> SinkDrops {
        self.drops
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    batches: Vec<Vec<PositionRecord>>,
    closed_intervals: usize,
    fail_after: Option<usize>,
}

/// In-memory sink. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every write after accepting `batches` batches.
    pub fn failing_after(batches: usize) -> Self {
        let sink = Self::default();
        sink.log.lock().fail_after = Some(batches);
        sink
    }

    /// All records received so far, in order.
    pub fn records(&self) -> Vec<PositionRecord> {
        self.log.lock().batches.iter().flatten().copied().collect()
    }

    /// Number of batches received.
    pub fn batch_count(&self) -> usize {
        self.log.lock().batches.len()
    }

    /// Sizes of the received batches.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.log.lock().batches.iter().map(Vec::len).collect()
    }

    /// Number of `close_interval` calls.
    pub fn closed_intervals(&self) -> usize {
        self.log.lock().closed_intervals
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&mut self, records: &[PositionRecord]) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_after.is_some_and(|limit| log.batches.len() >= limit) {
            return Err(ReaderError::sink("memory sink rejected batch"));
        }
        log.batches.push(records.to_vec());
        Ok(())
    }

    async fn close_interval(&mut self) -> Result<()> {
        self.log.lock().closed_intervals += 1;
        Ok(())
    }
}
