//! The acquisition loop.
//!
//! One cooperative task per stream. Each poll cycle:
//!
//! ```text
//!   drain zero commands
//!        │
//!   snapshot ──► extract window ──► demux ──► reconcile Z ──► unwrap X, Y, Z
//!                     │ empty                                      │
//!                     ▼                                            ▼
//!                   sleep ◄──── advance cursor ◄──── write ◄──── timestamp
//! ```
//!
//! Validation (alignment, channel lengths) happens before any axis state is
//! touched, so a discarded cycle is retried on the next poll from exactly
//! the same cursor and state. The scan is started on entry and released by
//! a guard on every exit path.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use usbquad_core::{
    Axis, DeviceClock, PerAxis, PositionRecord, ReaderConfig, ReaderError, RecordSink, Result,
    ScanSnapshot, ScanSource, SystemClock,
};

use crate::demux::demux;
use crate::reconcile::DualChannelReconciler;
use crate::stats::{AcquisitionCounters, AcquisitionStats};
use crate::stop::StopSignal;
use crate::timestamp::WindowTimestamper;
use crate::unwrapper::AxisUnwrapper;
use crate::window::ScanCursor;
use crate::zeroing::{zero_channel, ZeroHandle, ZeroOffsets, ZeroReceiver, DEFAULT_ZERO_QUEUE};

/// Why the loop exited without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The stop signal fired.
    Stopped,
    /// The scan source reported the scan is no longer running.
    ScanEnded,
}

/// Result of a completed acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionSummary {
    /// Why the loop exited.
    pub reason: ExitReason,
    /// Final counters.
    pub stats: AcquisitionStats,
    /// Final positions relative to the zero baselines.
    pub positions: PerAxis<f64>,
    /// Zero baselines in accumulated units.
    pub baseline: PerAxis<f64>,
    /// Final read position in the scan buffer.
    pub cursor: usize,
}

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No new samples.
    Empty,
    /// A window was reconstructed and written.
    Emitted {
        /// Records written.
        records: usize,
    },
    /// The window was misaligned and discarded; the cursor did not move.
    Discarded,
}

/// Outcome of one cycle plus the scan state observed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// What the cycle did.
    pub outcome: CycleOutcome,
    /// Whether the scan was still running at the snapshot.
    pub scan_running: bool,
}

/// Stops the scan when dropped, unless already released.
struct ScanGuard<S: ScanSource> {
    source: Option<Arc<S>>,
}

impl<S: ScanSource> ScanGuard<S> {
    fn new(source: Arc<S>) -> Self {
        Self {
            source: Some(source),
        }
    }

    fn release(mut self) -> Result<()> {
        match self.source.take() {
            Some(source) => source.stop_scan(),
            None => Ok(()),
        }
    }
}

impl<S: ScanSource> Drop for ScanGuard<S> {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            if let Err(e) = source.stop_scan() {
                error!(error = %e, "Failed to stop scan while unwinding");
            }
        }
    }
}

/// Per-stream reconstruction engine.
pub struct AcquisitionLoop<S: ScanSource, K: RecordSink> {
    source: Arc<S>,
    sink: K,
    clock: Arc<dyn DeviceClock>,
    config: ReaderConfig,
    reconciler: DualChannelReconciler,
    x: AxisUnwrapper,
    y: AxisUnwrapper,
    z: AxisUnwrapper,
    cursor: ScanCursor,
    timestamper: Option<WindowTimestamper>,
    counters: Arc<AcquisitionCounters>,
    stop: StopSignal,
    zero_handle: ZeroHandle,
    zero_rx: ZeroReceiver,
    offsets: ZeroOffsets,
}

impl<S: ScanSource + 'static, K: RecordSink> AcquisitionLoop<S, K> {
    /// Start building a loop over `source` writing into `sink`.
    pub fn builder(source: Arc<S>, sink: K) -> AcquisitionLoopBuilder<S, K> {
        AcquisitionLoopBuilder::new(source, sink)
    }

    /// Handle for zeroing axes while the loop runs.
    pub fn zero_handle(&self) -> ZeroHandle {
        self.zero_handle.clone()
    }

    /// Live counters.
    pub fn counters(&self) -> Arc<AcquisitionCounters> {
        Arc::clone(&self.counters)
    }

    /// Configuration in use.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Accumulated positions, before zero offsets.
    pub fn accumulated(&self) -> PerAxis<f64> {
        PerAxis {
            x: self.x.position(),
            y: self.y.position(),
            z: self.z.position(),
        }
    }

    /// Positions relative to the zero baselines.
    pub fn positions(&self) -> PerAxis<f64> {
        let accumulated = self.accumulated();
        PerAxis {
            x: self.offsets.apply(Axis::X, accumulated.x),
            y: self.offsets.apply(Axis::Y, accumulated.y),
            z: self.offsets.apply(Axis::Z, accumulated.z),
        }
    }

    /// Read position in the scan buffer.
    pub fn cursor(&self) -> usize {
        self.cursor.prev_index()
    }

    /// Run until stopped, until the scan ends, or until a fatal error.
    ///
    /// The scan is started here and stopped on every exit path, and the
    /// sink's capture interval is closed whatever the outcome.
    pub async fn run(mut self) -> Result<AcquisitionSummary> {
        let outcome = self.run_scoped().await;
        let closed = self.sink.close_interval().await;
        self.counters.set_drops(self.sink.drops());

        let reason = match (outcome, closed) {
            (Ok(reason), Ok(())) => reason,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "Failed to close capture interval");
                }
                error!(error = %e, class = %e.class(), "Acquisition failed");
                return Err(e);
            }
        };

        let summary = AcquisitionSummary {
            reason,
            stats: self.counters.snapshot(),
            positions: self.positions(),
            baseline: self.offsets.baseline(),
            cursor: self.cursor.prev_index(),
        };
        info!(
            reason = ?summary.reason,
            windows = summary.stats.windows,
            records = summary.stats.records,
            alignment_errors = summary.stats.alignment_errors,
            disagreements = summary.stats.disagreements,
            records_dropped = summary.stats.records_dropped,
            "Stopped acquisition"
        );
        Ok(summary)
    }

    async fn run_scoped(&mut self) -> Result<ExitReason> {
        self.source.start_scan().await?;
        let guard = ScanGuard::new(Arc::clone(&self.source));

        self.timestamper = Some(self.new_timestamper());
        info!(
            sample_rate_hz = self.config.acquisition.sample_rate_hz,
            capacity = self.config.capacity(),
            poll_interval_ms = self.config.acquisition.poll_interval_ms,
            "Started acquisition"
        );

        let reason = self.acquire().await?;
        guard.release()?;
        Ok(reason)
    }

    async fn acquire(&mut self) -> Result<ExitReason> {
        let poll_interval = self.config.acquisition.poll_interval();
        loop {
            if self.stop.is_stopped() {
                return Ok(ExitReason::Stopped);
            }

            let report = self.poll_once().await?;
            if !report.scan_running {
                info!("Scan no longer running");
                return Ok(ExitReason::ScanEnded);
            }

            if self.sleep(poll_interval).await {
                return Ok(ExitReason::Stopped);
            }
        }
    }

    /// Sleep one poll interval. Returns `true` if the stop signal fired.
    async fn sleep(&mut self, interval: Duration) -> bool {
        tokio::select! {
            _ = self.stop.stopped() => true,
            _ = tokio::time::sleep(interval) => false,
        }
    }

    /// Run a single poll cycle.
    ///
    /// Misaligned windows are discarded and reported as
    /// [`CycleOutcome::Discarded`]; every other error is terminal.
    pub async fn poll_once(&mut self) -> Result<CycleReport> {
        self.counters.record_poll();
        self.apply_zero_commands();

        let snapshot = self.source.snapshot().await?;
        let scan_running = snapshot.is_running();

        let outcome = match self.process(&snapshot).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_retryable() => {
                self.counters.record_alignment_error();
                warn!(
                    error = %e,
                    cursor = self.cursor.prev_index(),
                    index = snapshot.current_index,
                    "Discarding misaligned window"
                );
                CycleOutcome::Discarded
            }
            Err(e) => return Err(e),
        };

        Ok(CycleReport {
            outcome,
            scan_running,
        })
    }

    fn apply_zero_commands(&mut self) {
        let accumulated = self.accumulated();
        let applied = self.zero_rx.drain(&mut self.offsets, accumulated);
        for _ in 0..applied {
            self.counters.record_zero_request();
        }
    }

    async fn process(&mut self, snapshot: &ScanSnapshot) -> Result<CycleOutcome> {
        let pending = self.cursor.pending(snapshot, self.config.layout.stride);

        if pending.is_empty() {
            self.cursor.commit(&pending);
            self.counters.record_empty_poll();
            trace!(cursor = self.cursor.prev_index(), "No new samples");
            return Ok(CycleOutcome::Empty);
        }

        // Everything fallible and pure first; axis state is untouched on error.
        let window = demux(&pending.samples, &self.config.layout)?;
        let merged = self.reconciler.reconcile(&window.z1, &window.z2)?;
        let n = window.n_scans();
        if window.y.len() != n || merged.values.len() != n {
            return Err(ReaderError::ChannelLengthMismatch {
                expected: n,
                actual: window.y.len().min(merged.values.len()),
            });
        }

        let xs = self.x.unwrap_counts(&window.x);
        let ys = self.y.unwrap_counts(&window.y);
        let zs = self.z.unwrap(&merged.values);

        let interval_us = self.config.acquisition.sample_interval_us();
        let clock = Arc::clone(&self.clock);
        let timestamper = self
            .timestamper
            .get_or_insert_with(|| WindowTimestamper::from_clock(clock.as_ref(), interval_us));
        let stamps = timestamper.peek(n);

        let records: Vec<PositionRecord> = stamps
            .iter()
            .zip(xs.iter().zip(ys.iter().zip(&zs)))
            .map(|(&timestamp, (&x, (&y, &z)))| PositionRecord {
                timestamp,
                x: self.offsets.apply(Axis::X, x),
                y: self.offsets.apply(Axis::Y, y),
                z: self.offsets.apply(Axis::Z, z),
            })
            .collect();

        let written = self.sink.write(&records).await;
        self.counters.set_drops(self.sink.drops());
        written?;

        if let Some(timestamper) = self.timestamper.as_mut() {
            timestamper.advance(n);
        }
        self.cursor.commit(&pending);

        if pending.overwritten > 0 {
            self.counters.record_overrun(pending.overwritten);
        }
        self.counters.record_window(pending.samples.len(), records.len());
        self.counters.record_disagreements(merged.disagreements);
        for unwrapper in [&self.x, &self.y, &self.z] {
            self.counters.set_wraps(unwrapper.axis(), unwrapper.wrap_count());
        }

        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            debug!(
                records = records.len(),
                first_timestamp = first.timestamp,
                last_timestamp = last.timestamp,
                x = last.x,
                y = last.y,
                z = last.z,
                cursor = self.cursor.prev_index(),
                "Window reconstructed"
            );
        }

        Ok(CycleOutcome::Emitted {
            records: records.len(),
        })
    }

    fn new_timestamper(&self) -> WindowTimestamper {
        WindowTimestamper::from_clock(
            self.clock.as_ref(),
            self.config.acquisition.sample_interval_us(),
        )
    }
}

/// Builder for [`AcquisitionLoop`].
pub struct AcquisitionLoopBuilder<S: ScanSource, K: RecordSink> {
    source: Arc<S>,
    sink: K,
    config: ReaderConfig,
    clock: Option<Arc<dyn DeviceClock>>,
    stop: StopSignal,
    counters: Option<Arc<AcquisitionCounters>>,
    zero_queue: usize,
}

impl<S: ScanSource + 'static, K: RecordSink> AcquisitionLoopBuilder<S, K> {
    /// Builder with default configuration, the system clock and no stop signal.
    pub fn new(source: Arc<S>, sink: K) -> Self {
        Self {
            source,
            sink,
            config: ReaderConfig::default(),
            clock: None,
            stop: StopSignal::never(),
            counters: None,
            zero_queue: DEFAULT_ZERO_QUEUE,
        }
    }

    /// Reader configuration.
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Device clock used for the first window's start time.
    pub fn clock(mut self, clock: Arc<dyn DeviceClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Cooperative stop signal.
    pub fn stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Use counters owned by an observer instead of fresh ones.
    pub fn counters(mut self, counters: Arc<AcquisitionCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Depth of the zeroing command queue.
    pub fn zero_queue(mut self, depth: usize) -> Self {
        self.zero_queue = depth;
        self
    }

    /// Validate the configuration and build the loop.
    pub fn build(self) -> Result<AcquisitionLoop<S, K>> {
        let config = self.config;
        config.validate()?;

        let channels = self.source.channel_count();
        if channels != config.layout.stride {
            return Err(ReaderError::invalid_config(format!(
                "scan source has {} channels but the layout stride is {}",
                channels, config.layout.stride
            )));
        }

        let initial = config.acquisition.initial_positions;
        let x = AxisUnwrapper::with_initial_position(Axis::X, config.axes.x, initial.x)?;
        let y = AxisUnwrapper::with_initial_position(Axis::Y, config.axes.y, initial.y)?;
        let z = AxisUnwrapper::with_initial_position(Axis::Z, config.axes.z, initial.z)?;
        let (zero_handle, zero_rx) = zero_channel(self.zero_queue);

        Ok(AcquisitionLoop {
            source: self.source,
            sink: self.sink,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            reconciler: DualChannelReconciler::new(config.reconciliation),
            config,
            x,
            y,
            z,
            cursor: ScanCursor::new(),
            timestamper: None,
            counters: self.counters.unwrap_or_default(),
            stop: self.stop,
            zero_handle,
            zero_rx,
            offsets: ZeroOffsets::default(),
        })
    }
}
