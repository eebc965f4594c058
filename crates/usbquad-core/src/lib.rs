//! `usbquad-core`
//!
//! Core types and traits for reconstructing continuous axis positions from a
//! quadrature-encoder counter bank.
//!
//! The counter bank samples five channels into a circular hardware buffer:
//! X, Y, a redundant pair of Z channels and an extruder. This crate defines
//! the vocabulary shared by the reconstruction engine (`usbquad-reader`) and
//! its collaborators:
//!
//! - [`PositionRecord`]: one timestamped X/Y/Z sample, the unit of output
//! - [`AxisCalibration`] / [`ChannelLayout`]: immutable per-axis and
//!   per-channel settings, validated at construction
//! - [`ScanSource`], [`RecordSink`], [`DeviceClock`]: the external
//!   collaborators the acquisition loop is built from
//! - [`ReaderError`]: error taxonomy with retry classification
//! - [`ReaderConfig`]: layered Figment configuration

pub mod calibration;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod sink;
pub mod source;

pub use calibration::{
    AxesCalibration, AxisCalibration, ChannelLayout, ReconciliationPolicy, WindowSeed,
};
pub use clock::{DeviceClock, ManualClock, SystemClock};
pub use config::{AcquisitionConfig, LogFormat, LoggingConfig, ReaderConfig};
pub use data::{Axis, PerAxis, PositionRecord, RawCount};
pub use error::{ErrorClass, ReaderError, Result};
pub use sink::{RecordSink, SinkDrops};
pub use source::{ScanSnapshot, ScanSource, ScanStatus, INDEX_NOT_STARTED};
