//! JSON-lines record sink.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use usbquad_core::{PositionRecord, ReaderError, RecordSink, Result};

/// Writes one JSON object per record, one record per line.
///
/// Each batch is serialized into one buffer, written and flushed, so a
/// downstream pipe sees every window as soon as it is reconstructed.
pub struct JsonLinesSink<W: AsyncWrite + Unpin + Send> {
    writer: W,
    line_buffer: Vec<u8>,
    records: u64,
    batches: u64,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    /// Sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            line_buffer: Vec::new(),
            records: 0,
            batches: 0,
        }
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn write_error(e: impl std::fmt::Display) -> ReaderError {
    ReaderError::sink(format!("cannot write record: {}", e))
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RecordSink for JsonLinesSink<W> {
    async fn write(&mut self, records: &[PositionRecord]) -> Result<()> {
        self.line_buffer.clear();
        for record in records {
            serde_json::to_writer(&mut self.line_buffer, record).map_err(write_error)?;
            self.line_buffer.push(b'\n');
        }
        self.writer
            .write_all(&self.line_buffer)
            .await
            .map_err(write_error)?;
        self.writer.flush().await.map_err(write_error)?;
        self.records += records.len() as u64;
        self.batches += 1;
        Ok(())
    }

    async fn close_interval(&mut self) -> Result<()> {
        self.writer.flush().await.map_err(write_error)?;
        debug!(
            records = self.records,
            batches = self.batches,
            "Closed JSON-lines output"
        );
        Ok(())
    }
}
