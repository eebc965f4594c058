//! Data model shared by the reconstruction engine and its collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One raw tick count from a counter channel.
pub type RawCount = u32;

/// Logical axis reconstructed from the counter bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Linear X axis (single channel).
    X,
    /// Linear Y axis (single channel).
    Y,
    /// Rotary Z axis (redundant dual channel).
    Z,
}

impl Axis {
    /// All reconstructed axes, in record order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Lowercase label used in logs and configuration keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reconstructed sample: a timestamp and the three axis positions.
///
/// Records are immutable once emitted and are the unit of output handed to
/// a [`RecordSink`](crate::sink::RecordSink).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Device time in microseconds.
    pub timestamp: i64,
    /// X position in millimetres.
    pub x: f64,
    /// Y position in millimetres.
    pub y: f64,
    /// Z position in Z units (rotary axis).
    pub z: f64,
}

impl PositionRecord {
    /// Position of one axis.
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// A value per reconstructed axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerAxis<T> {
    /// X axis value.
    pub x: T,
    /// Y axis value.
    pub y: T,
    /// Z axis value.
    pub z: T,
}

impl<T: Copy> PerAxis<T> {
    /// Same value on every axis.
    pub fn splat(value: T) -> Self {
        Self {
            x: value,
            y: value,
            z: value,
        }
    }

    /// Value of one axis.
    pub fn get(&self, axis: Axis) -> T {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Mutable access to one axis.
    pub fn get_mut(&mut self, axis: Axis) -> &mut T {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}
