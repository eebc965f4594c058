//! Per-axis calibration and channel layout.
//!
//! Calibrations are fixed by mechanical gearing: each axis has its own
//! scale (ticks to physical units), wrap threshold (physical span of one
//! counter modulus) and wrap guard (minimum jump treated as a wraparound
//! rather than motion).

use serde::{Deserialize, Serialize};

use crate::data::Axis;
use crate::error::{ReaderError, Result};

/// X axis: ticks to millimetres.
pub const X_SCALE: f64 = 100.0 / 25726.0;
/// Y axis: ticks to millimetres.
pub const Y_SCALE: f64 = 100.0 / 25725.0;
/// Z axis: ticks to rotary units.
pub const Z_SCALE: f64 = 10.0 / 40961.0;

/// How an unwrapper seeds its last scaled raw value at the start of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSeed {
    /// Carry the last scaled raw value over from the previous window.
    #[default]
    Carry,
    /// Restart from the accumulated position modulo the wrap threshold.
    ///
    /// Used by genuinely rotary axes, whose physical range wraps.
    AccumulatedModulo,
}

/// Immutable calibration of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    /// Raw tick to physical unit factor.
    pub scale: f64,
    /// Physical span of one counter modulus.
    pub wrap_threshold: f64,
    /// Minimum jump magnitude classified as a wraparound.
    pub wrap_guard: f64,
    /// Window seeding policy.
    #[serde(default)]
    pub seed: WindowSeed,
}

impl AxisCalibration {
    /// Create a validated calibration with the [`WindowSeed::Carry`] policy.
    pub fn new(axis: Axis, scale: f64, wrap_threshold: f64, wrap_guard: f64) -> Result<Self> {
        let calibration = Self {
            scale,
            wrap_threshold,
            wrap_guard,
            seed: WindowSeed::Carry,
        };
        calibration.validate(axis)?;
        Ok(calibration)
    }

    /// Set the window seeding policy.
    pub fn with_seed(mut self, seed: WindowSeed) -> Self {
        self.seed = seed;
        self
    }

    /// Default X axis calibration.
    pub fn x_default() -> Self {
        Self {
            scale: X_SCALE,
            wrap_threshold: 254.8,
            wrap_guard: 200.0,
            seed: WindowSeed::Carry,
        }
    }

    /// Default Y axis calibration.
    pub fn y_default() -> Self {
        Self {
            scale: Y_SCALE,
            wrap_threshold: 254.8,
            wrap_guard: 200.0,
            seed: WindowSeed::Carry,
        }
    }

    /// Default Z axis calibration.
    pub fn z_default() -> Self {
        Self {
            scale: Z_SCALE,
            wrap_threshold: 16.0,
            wrap_guard: 7.0,
            seed: WindowSeed::AccumulatedModulo,
        }
    }

    /// Default calibration for an axis.
    pub fn default_for(axis: Axis) -> Self {
        match axis {
            Axis::X => Self::x_default(),
            Axis::Y => Self::y_default(),
            Axis::Z => Self::z_default(),
        }
    }

    /// Validate the calibration for the given axis.
    ///
    /// The wrap guard must lie strictly inside `(0, wrap_threshold)`: a guard
    /// at or above the threshold could never classify a single-modulus wrap.
    pub fn validate(&self, axis: Axis) -> Result<()> {
        let reject = |message: String| Err(ReaderError::InvalidCalibration { axis, message });

        if !self.scale.is_finite() || self.scale == 0.0 {
            return reject(format!("scale must be finite and non-zero, got {}", self.scale));
        }
        if !self.wrap_threshold.is_finite() || self.wrap_threshold <= 0.0 {
            return reject(format!(
                "wrap_threshold must be positive, got {}",
                self.wrap_threshold
            ));
        }
        if !self.wrap_guard.is_finite() || self.wrap_guard <= 0.0 {
            return reject(format!("wrap_guard must be positive, got {}", self.wrap_guard));
        }
        if self.wrap_guard >= self.wrap_threshold {
            return reject(format!(
                "wrap_guard {} must be below wrap_threshold {}",
                self.wrap_guard, self.wrap_threshold
            ));
        }
        Ok(())
    }
}

/// Calibrations of all three axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxesCalibration {
    /// X axis.
    pub x: AxisCalibration,
    /// Y axis.
    pub y: AxisCalibration,
    /// Z axis.
    pub z: AxisCalibration,
}

impl Default for AxesCalibration {
    fn default() -> Self {
        Self {
            x: AxisCalibration::x_default(),
            y: AxisCalibration::y_default(),
            z: AxisCalibration::z_default(),
        }
    }
}

impl AxesCalibration {
    /// Calibration of one axis.
    pub fn get(&self, axis: Axis) -> &AxisCalibration {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    /// Validate every axis.
    pub fn validate(&self) -> Result<()> {
        for axis in Axis::ALL {
            self.get(axis).validate(axis)?;
        }
        Ok(())
    }
}

/// Policy for merging the two redundant Z channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPolicy {
    /// Largest tolerated raw difference between the two channels.
    pub disagreement_limit: u32,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            disagreement_limit: 60_000,
        }
    }
}

/// Position of each logical channel inside one interleaved scan.
///
/// The counter bank writes one value per channel per scan, so channel `c`'s
/// `k`-th value sits at flat index `k * stride + c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    /// Number of channels per scan.
    pub stride: usize,
    /// First Z channel.
    pub z1: usize,
    /// Y channel.
    pub y: usize,
    /// Second Z channel.
    pub z2: usize,
    /// X channel.
    pub x: usize,
    /// Extruder channel; acquired but not reconstructed.
    #[serde(default)]
    pub extruder: Option<usize>,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            stride: 5,
            z1: 0,
            y: 1,
            z2: 2,
            x: 3,
            extruder: Some(4),
        }
    }
}

impl ChannelLayout {
    /// Validate that offsets are distinct and fit within the stride.
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(ReaderError::invalid_config("channel stride must be at least 1"));
        }

        let mut offsets = vec![("z1", self.z1), ("y", self.y), ("z2", self.z2), ("x", self.x)];
        if let Some(extruder) = self.extruder {
            offsets.push(("extruder", extruder));
        }

        for (i, (name, offset)) in offsets.iter().enumerate() {
            if *offset >= self.stride {
                return Err(ReaderError::invalid_config(format!(
                    "channel {} offset {} is outside stride {}",
                    name, offset, self.stride
                )));
            }
            if let Some((other, _)) = offsets[..i].iter().find(|(_, o)| o == offset) {
                return Err(ReaderError::invalid_config(format!(
                    "channels {} and {} share offset {}",
                    other, name, offset
                )));
            }
        }

        Ok(())
    }
}
