//! Reader configuration using Figment.
//!
//! Configuration is layered:
//! 1. Built-in defaults matching the USB-QUAD08 reader setup
//! 2. A TOML file (optional)
//! 3. Environment variables prefixed with `USBQUAD_`, nested keys separated
//!    by a double underscore
//!
//! # Example
//! ```no_run
//! use usbquad_core::config::ReaderConfig;
//!
//! # fn main() -> usbquad_core::Result<()> {
//! // USBQUAD_ACQUISITION__POLL_INTERVAL_MS=500 overrides the file value
//! let config = ReaderConfig::load_from("config/usbquad.toml")?;
//! config.validate()?;
//! println!("{} Hz", config.acquisition.sample_rate_hz);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::{AxesCalibration, ChannelLayout, ReconciliationPolicy};
use crate::data::PerAxis;
use crate::error::{ReaderError, Result};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "USBQUAD_";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/usbquad.toml";

/// Top-level reader configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Scan timing and buffer sizing
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Interleaved channel layout
    #[serde(default)]
    pub layout: ChannelLayout,
    /// Per-axis calibration
    #[serde(default)]
    pub axes: AxesCalibration,
    /// Z dual-channel reconciliation
    #[serde(default)]
    pub reconciliation: ReconciliationPolicy,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scan timing and buffer sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Hardware sample rate per channel in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,
    /// Circular buffer depth in scans (samples per channel)
    #[serde(default = "default_samples_per_channel")]
    pub samples_per_channel: usize,
    /// Delay between polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Accumulated positions at stream start (external zero offsets)
    #[serde(default)]
    pub initial_positions: PerAxis<f64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, coloured
    #[default]
    Pretty,
    /// Single-line, no colours
    Compact,
    /// Structured JSON
    Json,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_sample_rate() -> f64 {
    1000.0
}

fn default_samples_per_channel() -> usize {
    10_000
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
            samples_per_channel: default_samples_per_channel(),
            poll_interval_ms: default_poll_interval(),
            initial_positions: PerAxis::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Interval between consecutive samples of one channel, in microseconds.
    pub fn sample_interval_us(&self) -> f64 {
        1e6 / self.sample_rate_hz
    }

    /// Delay between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Time the circular buffer takes to lap once, in seconds.
    pub fn buffer_span_secs(&self) -> f64 {
        self.samples_per_channel as f64 / self.sample_rate_hz
    }

    /// Validate timing invariants.
    ///
    /// The buffer must hold more than one poll interval of samples, otherwise
    /// the hardware overwrites unread data between two polls.
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(ReaderError::invalid_config(format!(
                "sample_rate_hz must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        if self.samples_per_channel == 0 {
            return Err(ReaderError::invalid_config(
                "samples_per_channel must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ReaderError::invalid_config(
                "poll_interval_ms must be greater than 0",
            ));
        }

        let poll_secs = self.poll_interval().as_secs_f64();
        if self.buffer_span_secs() <= poll_secs {
            return Err(ReaderError::invalid_config(format!(
                "buffer of {} samples per channel at {} Hz laps in {:.3} s, \
                 which does not cover the {:.3} s poll interval",
                self.samples_per_channel,
                self.sample_rate_hz,
                self.buffer_span_secs(),
                poll_secs
            )));
        }

        for (name, value) in [
            ("x", self.initial_positions.x),
            ("y", self.initial_positions.y),
            ("z", self.initial_positions.z),
        ] {
            if !value.is_finite() {
                return Err(ReaderError::invalid_config(format!(
                    "initial position of axis {} must be finite",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl ReaderConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        debug!(
            path = %path.display(),
            exists = path.exists(),
            "Loaded reader configuration"
        );
        Ok(config)
    }

    /// Parse from a TOML string layered over the defaults, ignoring the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Self::figment().merge(Toml::string(toml)).extract()?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(ReaderConfig::default()))
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ReaderError::invalid_config(format!("cannot render config: {}", e)))
    }

    /// Circular buffer capacity in flat samples.
    pub fn capacity(&self) -> usize {
        self.acquisition.samples_per_channel * self.layout.stride
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ReaderError::invalid_config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        self.acquisition.validate()?;
        self.layout.validate()?;
        self.axes.validate()?;
        Ok(())
    }
}
