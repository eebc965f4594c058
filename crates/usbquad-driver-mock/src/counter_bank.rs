//! Simulated quadrature counter bank.
//!
//! Produces what a USB-QUAD08 running a continuous counter scan would:
//! interleaved 16-bit counts written into a circular buffer, a write cursor
//! that is `-1` until the first scan lands, and a running transfer count.
//! Each axis follows a [`MotionProfile`]; its counter reading is the
//! profile position in ticks, wrapped at the counter modulus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use usbquad_core::calibration::{X_SCALE, Y_SCALE, Z_SCALE};
use usbquad_core::{
    Axis, ChannelLayout, PerAxis, RawCount, ReaderConfig, ReaderError, Result, ScanSnapshot,
    ScanSource, ScanStatus, INDEX_NOT_STARTED,
};

use crate::common::{FaultScenario, MockMode, MockRng};
use crate::motion::{counter_value, position_to_ticks, MotionProfile, COUNTER_MODULUS};

/// Static configuration of a simulated bank.
#[derive(Debug, Clone)]
pub struct CounterBankConfig {
    /// Scans per second
    pub sample_rate_hz: f64,
    /// Circular buffer depth in scans
    pub samples_per_channel: usize,
    /// Channel positions within a scan
    pub layout: ChannelLayout,
    /// Physical units per tick, per axis
    pub scales: PerAxis<f64>,
    /// Motion of each axis
    pub profiles: PerAxis<MotionProfile>,
    /// Extruder motion, in ticks
    pub extruder: MotionProfile,
    /// Counter modulus
    pub modulus: u32,
    /// How simulated time advances
    pub mode: MockMode,
    /// Scans added per snapshot in [`MockMode::Instant`]
    pub scans_per_snapshot: u64,
    /// Snapshots after start that still report no scans
    pub start_delay_snapshots: u64,
    /// Uniform counter noise amplitude in ticks
    pub noise_ticks: u32,
    /// Noise seed; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Injected faults
    pub faults: Vec<FaultScenario>,
}

impl Default for CounterBankConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1000.0,
            samples_per_channel: 10_000,
            layout: ChannelLayout::default(),
            scales: PerAxis {
                x: X_SCALE,
                y: Y_SCALE,
                z: Z_SCALE,
            },
            profiles: PerAxis::default(),
            extruder: MotionProfile::default(),
            modulus: COUNTER_MODULUS,
            mode: MockMode::default(),
            scans_per_snapshot: 1000,
            start_delay_snapshots: 0,
            noise_ticks: 0,
            seed: None,
            faults: Vec::new(),
        }
    }
}

impl CounterBankConfig {
    /// Buffer capacity in flat samples.
    pub fn capacity(&self) -> usize {
        self.samples_per_channel * self.layout.stride
    }

    fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(ReaderError::invalid_config(
                "simulated sample rate must be positive",
            ));
        }
        if self.samples_per_channel == 0 {
            return Err(ReaderError::invalid_config(
                "simulated buffer must hold at least one scan",
            ));
        }
        if self.modulus == 0 {
            return Err(ReaderError::invalid_config("counter modulus must be non-zero"));
        }
        for axis in Axis::ALL {
            let scale = self.scales.get(axis);
            if !scale.is_finite() || scale == 0.0 {
                return Err(ReaderError::invalid_config(format!(
                    "simulated scale of axis {} must be finite and non-zero",
                    axis
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BankState {
    status: ScanStatus,
    buffer: Vec<RawCount>,
    scans_written: u64,
    snapshots: u64,
    started_at: Option<Instant>,
}

/// Simulated counter bank implementing [`ScanSource`].
#[derive(Debug)]
pub struct SimulatedCounterBank {
    config: CounterBankConfig,
    rng: MockRng,
    state: Mutex<BankState>,
    start_calls: AtomicU64,
    stop_calls: AtomicU64,
}

impl SimulatedCounterBank {
    /// Bank with default configuration: all axes at rest at zero.
    pub fn new() -> Self {
        Self::from_validated(CounterBankConfig::default())
    }

    fn from_validated(config: CounterBankConfig) -> Self {
        let rng = MockRng::new(config.seed);
        Self {
            config,
            rng,
            state: Mutex::new(BankState::default()),
            start_calls: AtomicU64::new(0),
            stop_calls: AtomicU64::new(0),
        }
    }

    /// Create a builder.
    pub fn builder() -> CounterBankBuilder {
        CounterBankBuilder::new()
    }

    /// Configuration in use.
    pub fn config(&self) -> &CounterBankConfig {
        &self.config
    }

    /// Number of `start_scan` calls.
    pub fn start_calls(&self) -> u64 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop_scan` calls.
    pub fn stop_calls(&self) -> u64 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Current scan status.
    pub fn status(&self) -> ScanStatus {
        self.state.lock().status
    }

    /// Scans written since the scan started.
    pub fn scans_written(&self) -> u64 {
        self.state.lock().scans_written
    }

    /// Time of scan `scan` in seconds after the start.
    pub fn scan_time(&self, scan: u64) -> f64 {
        scan as f64 / self.config.sample_rate_hz
    }

    /// Noise-free position of `axis` at scan `scan`, quantized to whole ticks.
    pub fn expected_position(&self, axis: Axis, scan: u64) -> f64 {
        let scale = self.config.scales.get(axis);
        let position = self.config.profiles.get(axis).position_at(self.scan_time(scan));
        position_to_ticks(position, scale) as f64 * scale
    }

    fn axis_ticks(&self, axis: Axis, t: f64) -> i64 {
        let position = self.config.profiles.get(axis).position_at(t);
        let ticks = position_to_ticks(position, self.config.scales.get(axis));
        ticks + self.rng.jitter(self.config.noise_ticks)
    }

    fn write_scan(&self, buffer: &mut [RawCount], scan: u64) {
        let config = &self.config;
        let layout = &config.layout;
        let t = self.scan_time(scan);
        let base = (scan % config.samples_per_channel as u64) as usize * layout.stride;

        let modulus = config.modulus;
        buffer[base + layout.x] = counter_value(self.axis_ticks(Axis::X, t), modulus);
        buffer[base + layout.y] = counter_value(self.axis_ticks(Axis::Y, t), modulus);
        buffer[base + layout.z1] = counter_value(self.axis_ticks(Axis::Z, t), modulus);
        buffer[base + layout.z2] = counter_value(self.axis_ticks(Axis::Z, t), modulus);
        if let Some(extruder) = layout.extruder {
            let ticks = config.extruder.position_at(t).round() as i64;
            buffer[base + extruder] = counter_value(ticks, modulus);
        }

        for fault in &config.faults {
            for channel in 0..layout.stride {
                if let Some(value) = fault.corrupt(scan, channel) {
                    buffer[base + channel] = value;
                }
            }
        }
    }

    fn write_scans(&self, state: &mut BankState, target: u64) {
        // Scans older than one buffer lap would be overwritten anyway.
        let first = state
            .scans_written
            .max(target.saturating_sub(self.config.samples_per_channel as u64));
        for scan in first..target {
            self.write_scan(&mut state.buffer, scan);
        }
        state.scans_written = target.max(state.scans_written);
    }

    fn target_scans(&self, state: &BankState) -> u64 {
        match self.config.mode {
            MockMode::Instant => {
                if state.snapshots <= self.config.start_delay_snapshots {
                    state.scans_written
                } else {
                    state.scans_written + self.config.scans_per_snapshot
                }
            }
            MockMode::Realistic => {
                let elapsed = state
                    .started_at
                    .map_or(0.0, |start| start.elapsed().as_secs_f64());
                let scans = (elapsed * self.config.sample_rate_hz).floor() as u64;
                scans.max(state.scans_written)
            }
        }
    }

    fn stop_limit(&self) -> Option<u64> {
        self.config.faults.iter().find_map(|fault| match fault {
            FaultScenario::StopAfterScans { scans } => Some(*scans),
            _ => None,
        })
    }

    fn fail_limit(&self) -> Option<u64> {
        self.config.faults.iter().find_map(|fault| match fault {
            FaultScenario::FailAfterSnapshots { count } => Some(*count),
            _ => None,
        })
    }

    fn cursor_offset(&self, snapshot: u64) -> usize {
        self.config
            .faults
            .iter()
            .filter_map(|fault| match fault {
                FaultScenario::MisalignCursor {
                    snapshot: target,
                    offset,
                } if *target == snapshot => Some(*offset),
                _ => None,
            })
            .sum()
    }
}

impl Default for SimulatedCounterBank {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanSource for SimulatedCounterBank {
    fn channel_count(&self) -> usize {
        self.config.layout.stride
    }

    async fn start_scan(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.config.faults.contains(&FaultScenario::FailOnStart) {
            return Err(ReaderError::source("simulated start failure"));
        }

        let mut state = self.state.lock();
        if state.status == ScanStatus::Running {
            return Err(ReaderError::source("scan already running"));
        }
        *state = BankState {
            status: ScanStatus::Running,
            buffer: vec![0; self.config.capacity()],
            scans_written: 0,
            snapshots: 0,
            started_at: Some(Instant::now()),
        };
        info!(
            rate = self.config.sample_rate_hz,
            capacity = self.config.capacity(),
            mode = ?self.config.mode,
            "Simulated counter scan started"
        );
        Ok(())
    }

    async fn snapshot(&self) -> Result<ScanSnapshot> {
        let mut state = self.state.lock();
        state.snapshots += 1;

        if let Some(count) = self.fail_limit() {
            if state.snapshots > count {
                return Err(ReaderError::source(format!(
                    "simulated device failure after {} snapshots",
                    count
                )));
            }
        }

        if state.status == ScanStatus::Running {
            let mut target = self.target_scans(&state);
            if let Some(limit) = self.stop_limit() {
                if target >= limit {
                    target = limit.max(state.scans_written);
                    state.status = ScanStatus::Stopped;
                    info!(scans = target, "Simulated counter scan ended");
                }
            }
            self.write_scans(&mut state, target);
        }

        let stride = self.config.layout.stride;
        let capacity = self.config.capacity();
        let current_index = if state.scans_written == 0 {
            INDEX_NOT_STARTED
        } else {
            let flat = (state.scans_written * stride as u64) % capacity as u64;
            let offset = self.cursor_offset(state.snapshots) as u64;
            ((flat + offset) % capacity as u64) as i64
        };

        debug!(
            snapshot = state.snapshots,
            scans = state.scans_written,
            index = current_index,
            "Simulated snapshot"
        );

        Ok(ScanSnapshot {
            status: state.status,
            current_index,
            total_count: Some(state.scans_written * stride as u64),
            buffer: Arc::from(state.buffer.as_slice()),
        })
    }

    fn stop_scan(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.status == ScanStatus::Running {
            state.status = ScanStatus::Stopped;
            info!(scans = state.scans_written, "Simulated counter scan stopped");
        }
        Ok(())
    }
}

/// Builder for [`SimulatedCounterBank`].
#[derive(Debug, Clone, Default)]
pub struct CounterBankBuilder {
    config: CounterBankConfig,
}

impl CounterBankBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose rate, buffer, layout and scales match a reader configuration.
    pub fn matching(reader: &ReaderConfig) -> Self {
        Self::new()
            .sample_rate(reader.acquisition.sample_rate_hz)
            .samples_per_channel(reader.acquisition.samples_per_channel)
            .layout(reader.layout)
            .scale(Axis::X, reader.axes.x.scale)
            .scale(Axis::Y, reader.axes.y.scale)
            .scale(Axis::Z, reader.axes.z.scale)
    }

    /// Scans per second.
    pub fn sample_rate(mut self, hz: f64) -> Self {
        self.config.sample_rate_hz = hz;
        self
    }

    /// Circular buffer depth in scans.
    pub fn samples_per_channel(mut self, samples: usize) -> Self {
        self.config.samples_per_channel = samples;
        self
    }

    /// Channel layout.
    pub fn layout(mut self, layout: ChannelLayout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Units per tick of one axis.
    pub fn scale(mut self, axis: Axis, scale: f64) -> Self {
        *self.config.scales.get_mut(axis) = scale;
        self
    }

    /// Motion of one axis.
    pub fn profile(mut self, axis: Axis, profile: MotionProfile) -> Self {
        *self.config.profiles.get_mut(axis) = profile;
        self
    }

    /// Extruder motion in ticks.
    pub fn extruder(mut self, profile: MotionProfile) -> Self {
        self.config.extruder = profile;
        self
    }

    /// Counter modulus.
    pub fn modulus(mut self, modulus: u32) -> Self {
        self.config.modulus = modulus;
        self
    }

    /// Time mode.
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Scans added per snapshot in [`MockMode::Instant`].
    pub fn scans_per_snapshot(mut self, scans: u64) -> Self {
        self.config.scans_per_snapshot = scans;
        self
    }

    /// Snapshots after start that still report the scan as not started.
    pub fn start_delay_snapshots(mut self, snapshots: u64) -> Self {
        self.config.start_delay_snapshots = snapshots;
        self
    }

    /// Counter noise amplitude in ticks.
    pub fn noise_ticks(mut self, ticks: u32) -> Self {
        self.config.noise_ticks = ticks;
        self
    }

    /// Noise seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Add a fault.
    pub fn fault(mut self, fault: FaultScenario) -> Self {
        self.config.faults.push(fault);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<SimulatedCounterBank> {
        self.config.validate()?;
        Ok(SimulatedCounterBank::from_validated(self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CounterBankBuilder {
        SimulatedCounterBank::builder()
            .samples_per_channel(10)
            .scans_per_snapshot(4)
    }

    #[tokio::test]
    async fn test_not_started_cursor() {
        let bank = small().build().unwrap();
        let snapshot = bank.snapshot().await.unwrap();
        assert_eq!(snapshot.status, ScanStatus::Idle);
        assert_eq!(snapshot.current_index, INDEX_NOT_STARTED);

        let bank = small().start_delay_snapshots(1).build().unwrap();
        bank.start_scan().await.unwrap();
        let first = bank.snapshot().await.unwrap();
        assert!(first.is_running());
        assert_eq!(first.current_index, INDEX_NOT_STARTED);
        assert_eq!(first.total_count, Some(0));
        let second = bank.snapshot().await.unwrap();
        assert_eq!(second.current_index, 20);
    }

    #[tokio::test]
    async fn test_cursor_wraps_buffer() {
        let bank = small().build().unwrap();
        bank.start_scan().await.unwrap();
        let indices: Vec<i64> = {
            let mut out = Vec::new();
            for _ in 0..3 {
                out.push(bank.snapshot().await.unwrap().current_index);
            }
            out
        };
        // 4 scans of 5 channels per snapshot in a 50-sample buffer.
        assert_eq!(indices, vec![20, 40, 10]);
        assert_eq!(bank.scans_written(), 12);
    }

    #[tokio::test]
    async fn test_counts_follow_profile() {
        let bank = small()
            .profile(Axis::X, MotionProfile::ramp(0.0, 1.0))
            .scale(Axis::X, 0.001)
            .build()
            .unwrap();
        bank.start_scan().await.unwrap();
        let snapshot = bank.snapshot().await.unwrap();

        let layout = ChannelLayout::default();
        for scan in 0..4usize {
            // 1 unit/s at 1000 Hz and 0.001 units/tick: one tick per scan.
            assert_eq!(snapshot.buffer[scan * 5 + layout.x], scan as RawCount);
        }
    }

    #[tokio::test]
    async fn test_counter_wraps_at_modulus() {
        let bank = small()
            .modulus(8)
            .scale(Axis::Y, 1.0)
            .profile(Axis::Y, MotionProfile::ramp(6.0, 1000.0))
            .build()
            .unwrap();
        bank.start_scan().await.unwrap();
        let snapshot = bank.snapshot().await.unwrap();
        let y: Vec<RawCount> = (0..4).map(|s| snapshot.buffer[s * 5 + 1]).collect();
        assert_eq!(y, vec![6, 7, 0, 1]);
    }

    #[tokio::test]
    async fn test_corrupt_channel_fault() {
        let bank = small()
            .fault(FaultScenario::CorruptChannel {
                channel: 2,
                every_n_scans: 2,
                value: 60_000,
            })
            .build()
            .unwrap();
        bank.start_scan().await.unwrap();
        let snapshot = bank.snapshot().await.unwrap();
        let z2: Vec<RawCount> = (0..4).map(|s| snapshot.buffer[s * 5 + 2]).collect();
        assert_eq!(z2, vec![0, 0, 60_000, 0]);
    }

    #[tokio::test]
    async fn test_stop_after_scans() {
        let bank = small()
            .fault(FaultScenario::StopAfterScans { scans: 6 })
            .build()
            .unwrap();
        bank.start_scan().await.unwrap();
        assert!(bank.snapshot().await.unwrap().is_running());
        let last = bank.snapshot().await.unwrap();
        assert_eq!(last.status, ScanStatus::Stopped);
        assert_eq!(last.total_count, Some(30));
        // Stopped: nothing more is written.
        let after = bank.snapshot().await.unwrap();
        assert_eq!(after.total_count, Some(30));
    }

    #[tokio::test]
    async fn test_fail_after_snapshots() {
        let bank = small()
            .fault(FaultScenario::FailAfterSnapshots { count: 1 })
            .build()
            .unwrap();
        bank.start_scan().await.unwrap();
        assert!(bank.snapshot().await.is_ok());
        assert!(bank.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let bank = small().build().unwrap();
        bank.start_scan().await.unwrap();
        assert!(bank.start_scan().await.is_err());
        bank.stop_scan().unwrap();
        bank.stop_scan().unwrap();
        assert_eq!(bank.status(), ScanStatus::Stopped);
        assert_eq!(bank.stop_calls(), 2);
        assert_eq!(bank.start_calls(), 2);

        let failing = small().fault(FaultScenario::FailOnStart).build().unwrap();
        assert!(failing.start_scan().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realistic_mode_follows_tokio_time() {
        let bank = small()
            .samples_per_channel(1000)
            .mode(MockMode::Realistic)
            .build()
            .unwrap();
        bank.start_scan().await.unwrap();
        assert_eq!(bank.snapshot().await.unwrap().current_index, INDEX_NOT_STARTED);

        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        let snapshot = bank.snapshot().await.unwrap();
        assert_eq!(snapshot.total_count, Some(250 * 5));
        assert_eq!(snapshot.current_index, 1250);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        assert!(small().sample_rate(0.0).build().is_err());
        assert!(small().samples_per_channel(0).build().is_err());
        assert!(small().scale(Axis::Z, 0.0).build().is_err());
    }

    #[test]
    fn test_matching_reader_config() {
        let reader = ReaderConfig::default();
        let bank = CounterBankBuilder::matching(&reader).build().unwrap();
        assert_eq!(bank.config().capacity(), reader.capacity());
        assert_eq!(bank.config().scales.z, reader.axes.z.scale);
    }
}
