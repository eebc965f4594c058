//! Wraparound-aware unwrapping of modular counter values.
//!
//! A quadrature counter returns to zero after its modulus, so the raw signal
//! is bounded and periodic. [`AxisUnwrapper`] turns it into an unbounded,
//! continuous position:
//!
//! 1. scale the raw count into physical units
//! 2. compare against the previous scaled value
//! 3. a jump larger than the wrap guard is a single wraparound and is
//!    corrected by the wrap threshold; anything else is motion
//!
//! Exactly one wrap is assumed between consecutive samples. Sampling fast
//! enough to keep true inter-sample motion below one modulus is a physical
//! precondition and is not checked here; wraps are counted so unexpected
//! jumps can at least be noticed.

use tracing::debug;

use usbquad_core::{Axis, AxisCalibration, RawCount, Result, WindowSeed};

/// Persistent unwrap state of one axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisState {
    /// Scaled value of the previous sample.
    pub last_scaled_raw: f64,
    /// Continuous position after the previous sample.
    pub accumulated: f64,
}

impl AxisState {
    /// State at stream start, positioned at `position`.
    ///
    /// The counters read zero when a scan starts, so the previous scaled
    /// value is zero whatever the accumulated offset.
    pub fn at(position: f64) -> Self {
        Self {
            last_scaled_raw: 0.0,
            accumulated: position,
        }
    }
}

/// Stateful raw-to-position converter for a single axis.
#[derive(Debug, Clone)]
pub struct AxisUnwrapper {
    axis: Axis,
    calibration: AxisCalibration,
    initial: AxisState,
    state: AxisState,
    wraps: u64,
}

impl AxisUnwrapper {
    /// Create an unwrapper starting at position zero.
    ///
    /// Rejects invalid calibrations.
    pub fn new(axis: Axis, calibration: AxisCalibration) -> Result<Self> {
        Self::with_initial_position(axis, calibration, 0.0)
    }

    /// Create an unwrapper starting at `position`, e.g. an external zero offset.
    pub fn with_initial_position(
        axis: Axis,
        calibration: AxisCalibration,
        position: f64,
    ) -> Result<Self> {
        Self::with_state(axis, calibration, AxisState::at(position))
    }

    /// Create an unwrapper resuming from a known state.
    pub fn with_state(
        axis: Axis,
        calibration: AxisCalibration,
        initial: AxisState,
    ) -> Result<Self> {
        calibration.validate(axis)?;
        Ok(Self {
            axis,
            calibration,
            initial,
            state: initial,
            wraps: 0,
        })
    }

    /// Axis this unwrapper reconstructs.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Calibration in use.
    pub fn calibration(&self) -> &AxisCalibration {
        &self.calibration
    }

    /// Current state.
    pub fn state(&self) -> AxisState {
        self.state
    }

    /// Continuous position after the last processed sample.
    pub fn position(&self) -> f64 {
        self.state.accumulated
    }

    /// Number of wraparounds corrected so far.
    pub fn wrap_count(&self) -> u64 {
        self.wraps
    }

    /// Return to the state the unwrapper was created with.
    pub fn reset(&mut self) {
        self.state = self.initial;
        self.wraps = 0;
    }

    /// Unwrap raw counter values.
    pub fn unwrap_counts(&mut self, raw: &[RawCount]) -> Vec<f64> {
        let values: Vec<f64> = raw.iter().map(|&r| f64::from(r)).collect();
        self.unwrap(&values)
    }

    /// Unwrap one window of raw values (in ticks) into continuous positions.
    ///
    /// An empty window returns an empty sequence and leaves the state
    /// untouched; the caller keeps the last known position.
    pub fn unwrap(&mut self, raw: &[f64]) -> Vec<f64> {
        if raw.is_empty() {
            return Vec::new();
        }

        let AxisCalibration {
            scale,
            wrap_threshold,
            wrap_guard,
            seed,
        } = self.calibration;

        let mut last = match seed {
            WindowSeed::Carry => self.state.last_scaled_raw,
            WindowSeed::AccumulatedModulo => self.state.accumulated.rem_euclid(wrap_threshold),
        };
        let mut accumulated = self.state.accumulated;
        let mut out = Vec::with_capacity(raw.len());

        for &r in raw {
            let cur = r * scale;
            let delta = cur - last;

            if delta.abs() > wrap_guard {
                if last < cur {
                    accumulated -= wrap_threshold - cur + last;
                } else {
                    accumulated += wrap_threshold - last + cur;
                }
                self.wraps += 1;
                debug!(
                    axis = %self.axis,
                    last,
                    cur,
                    raw = r,
                    position = accumulated,
                    "Counter wraparound"
                );
            } else {
                accumulated += delta;
            }

            out.push(accumulated);
            last = cur;
        }

        self.state = AxisState {
            last_scaled_raw: last,
            accumulated,
        };
        out
    }
}
