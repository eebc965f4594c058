//! Error types for position reconstruction.
//!
//! `ReaderError` covers every failure mode of the reconstruction engine and
//! of its collaborators. Each variant belongs to one [`ErrorClass`], which
//! tells the acquisition loop whether the failure ends the stream or only
//! the current poll cycle.
//!
//! ## Error Classes
//!
//! - **Configuration**: invalid calibration, layout or acquisition settings.
//!   Rejected at construction, never retried.
//! - **Alignment**: the demuxed per-channel sequences of one window disagree
//!   in length. The cycle is discarded and retried on the next poll with the
//!   previous axis state untouched.
//! - **Source** / **Sink**: the hardware scan provider or the record consumer
//!   failed. Terminal for the stream; reconnecting is the collaborator's job.
//! - **Lifecycle**: a control command outlived the loop it was meant for.
//!
//! Z-channel disagreements are deliberately absent: they are recovered
//! locally by substitution and only show up in the statistics.

use std::fmt;

use thiserror::Error;

use crate::data::Axis;

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur while reconstructing encoder positions.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Axis calibration rejected at construction.
    #[error("Invalid calibration for axis {axis}: {message}")]
    InvalidCalibration { axis: Axis, message: String },

    /// Semantically invalid configuration value.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Window length is not a whole number of scans.
    #[error("Misaligned window: {len} samples is not a multiple of {stride} channels")]
    MisalignedWindow { len: usize, stride: usize },

    /// Two per-channel sequences of the same window differ in length.
    #[error("Channel length mismatch: expected {expected} samples, got {actual}")]
    ChannelLengthMismatch { expected: usize, actual: usize },

    /// The hardware scan provider failed.
    #[error("Scan source error: {message}")]
    Source { message: String },

    /// The record sink rejected a batch.
    #[error("Record sink error: {message}")]
    Sink { message: String },

    /// The record sink's receiving side has gone away.
    #[error("Record sink closed")]
    SinkClosed,

    /// A control command reached an acquisition loop that has exited.
    #[error("Acquisition loop is not running")]
    NotRunning,
}

/// Coarse classification used to decide how the loop reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal, non-retryable; surfaces before acquisition starts.
    Configuration,
    /// Fatal for one cycle only.
    Alignment,
    /// Scan provider failure; terminal for the stream.
    Source,
    /// Consumer failure; terminal for the stream.
    Sink,
    /// Command sent to a loop that is gone.
    Lifecycle,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Alignment => "alignment",
            ErrorClass::Source => "source",
            ErrorClass::Sink => "sink",
            ErrorClass::Lifecycle => "lifecycle",
        };
        write!(f, "{}", label)
    }
}

impl ReaderError {
    /// Shorthand for an [`ReaderError::InvalidConfig`] error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Shorthand for a [`ReaderError::Source`] error.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Shorthand for a [`ReaderError::Sink`] error.
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidCalibration { .. } | Self::InvalidConfig { .. } | Self::Config(_) => {
                ErrorClass::Configuration
            }
            Self::MisalignedWindow { .. } | Self::ChannelLengthMismatch { .. } => {
                ErrorClass::Alignment
            }
            Self::Source { .. } => ErrorClass::Source,
            Self::Sink { .. } | Self::SinkClosed => ErrorClass::Sink,
            Self::NotRunning => ErrorClass::Lifecycle,
        }
    }

    /// Whether the next poll cycle may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Alignment
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        self.class() == ErrorClass::Configuration
    }
}

impl From<figment::Error> for ReaderError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReaderError::MisalignedWindow { len: 4, stride: 5 };
        assert!(err.to_string().contains('4'));
        assert!(err.to_string().contains('5'));

        let err = ReaderError::InvalidCalibration {
            axis: Axis::Z,
            message: "scale must be non-zero".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid calibration for axis z: scale must be non-zero"
        );
    }

    #[test]
    fn test_error_classes() {
        assert!(ReaderError::MisalignedWindow { len: 4, stride: 5 }.is_retryable());
        assert!(ReaderError::ChannelLengthMismatch {
            expected: 3,
            actual: 2
        }
        .is_retryable());
        assert!(!ReaderError::source("usb gone").is_retryable());
        assert!(!ReaderError::SinkClosed.is_retryable());
        assert!(ReaderError::invalid_config("bad").is_configuration());
        assert_eq!(ReaderError::sink("full").class(), ErrorClass::Sink);
        assert_eq!(ErrorClass::Alignment.to_string(), "alignment");
        assert_eq!(ReaderError::NotRunning.class(), ErrorClass::Lifecycle);
    }
}
