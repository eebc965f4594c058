//! Simulated axis motion and its quadrature counter readout.

use std::f64::consts::TAU;

use usbquad_core::RawCount;

/// Modulus of the 16-bit counters on the USB-QUAD08.
pub const COUNTER_MODULUS: u32 = 1 << 16;

/// Position of one axis as a function of time, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionProfile {
    /// Holds a fixed position.
    Stationary {
        /// Position in physical units
        position: f64,
    },
    /// Moves at constant velocity.
    Ramp {
        /// Position at t = 0
        start: f64,
        /// Units per second; negative moves backwards
        velocity: f64,
    },
    /// Oscillates around a center position.
    Sine {
        /// Center position
        center: f64,
        /// Peak deviation from the center
        amplitude: f64,
        /// Period in seconds
        period_s: f64,
    },
}

impl Default for MotionProfile {
    fn default() -> Self {
        MotionProfile::Stationary { position: 0.0 }
    }
}

impl MotionProfile {
    /// Axis at rest at `position`.
    pub fn stationary(position: f64) -> Self {
        MotionProfile::Stationary { position }
    }

    /// Constant-velocity motion.
    pub fn ramp(start: f64, velocity: f64) -> Self {
        MotionProfile::Ramp { start, velocity }
    }

    /// Sinusoidal motion.
    pub fn sine(center: f64, amplitude: f64, period_s: f64) -> Self {
        MotionProfile::Sine {
            center,
            amplitude,
            period_s,
        }
    }

    /// Position at time `t` seconds after the scan started.
    pub fn position_at(&self, t: f64) -> f64 {
        match *self {
            MotionProfile::Stationary { position } => position,
            MotionProfile::Ramp { start, velocity } => start + velocity * t,
            MotionProfile::Sine {
                center,
                amplitude,
                period_s,
            } => {
                if period_s <= 0.0 {
                    center
                } else {
                    center + amplitude * (TAU * t / period_s).sin()
                }
            }
        }
    }
}

/// Absolute encoder ticks for `position` at `scale` units per tick.
pub fn position_to_ticks(position: f64, scale: f64) -> i64 {
    (position / scale).round() as i64
}

/// What the counter reads for an absolute tick count.
pub fn counter_value(ticks: i64, modulus: u32) -> RawCount {
    // rem_euclid keeps the result in 0..modulus, which fits in u32.
    ticks.rem_euclid(i64::from(modulus.max(1))) as RawCount
}
