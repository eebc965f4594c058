//! `usbquad-reader`
//!
//! Reconstructs continuous X, Y and Z positions from the raw modular counts
//! a quadrature counter bank writes into its circular scan buffer.
//!
//! The pipeline, leaves first:
//!
//! - [`window`]: new samples between two polls of the circular buffer
//! - [`demux`]: interleaved samples into per-channel sequences
//! - [`reconcile`]: the two redundant Z channels into one
//! - [`unwrapper`]: modular counts into unbounded positions, per axis
//! - [`timestamp`]: per-sample device timestamps
//! - [`acquisition`]: the poll loop tying them together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use usbquad_core::{ReaderConfig, ScanSource};
//! use usbquad_reader::{stop_channel, AcquisitionLoop, MemorySink};
//!
//! # async fn example<S: ScanSource + 'static>(source: Arc<S>) -> usbquad_core::Result<()> {
//! let sink = MemorySink::new();
//! let (stop, signal) = stop_channel();
//! let acquisition = AcquisitionLoop::builder(source, sink.clone())
//!     .config(ReaderConfig::load()?)
//!     .stop_signal(signal)
//!     .build()?;
//!
//! let zero = acquisition.zero_handle();
//! let task = tokio::spawn(acquisition.run());
//! zero.zero_all().await?;
//! stop.stop();
//! # let _ = task.await;
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod demux;
pub mod reconcile;
pub mod sink;
pub mod stats;
pub mod stop;
pub mod timestamp;
pub mod unwrapper;
pub mod window;
pub mod zeroing;

pub use acquisition::{
    AcquisitionLoop, AcquisitionLoopBuilder, AcquisitionSummary, CycleOutcome, CycleReport,
    ExitReason,
};
pub use demux::{demux, DemuxedWindow};
pub use reconcile::{reconcile, DualChannelReconciler, Reconciled};
pub use sink::{ChannelSink, MemorySink, PositionBatch, SinkMessage, SinkMode, SinkReceiver};
pub use stats::{AcquisitionCounters, AcquisitionStats};
pub use stop::{stop_channel, StopHandle, StopSignal};
pub use timestamp::{timestamps, WindowTimestamper};
pub use unwrapper::{AxisState, AxisUnwrapper};
pub use window::{extract, PendingWindow, ScanCursor};
pub use zeroing::{zero_channel, ZeroHandle, ZeroOffsets, ZeroTarget};
