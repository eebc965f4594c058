//! Simulated quadrature counter bank for usbquad
//!
//! This crate provides a [`SimulatedCounterBank`] implementing
//! [`ScanSource`](usbquad_core::ScanSource), so the reconstruction engine
//! can run without the USB-QUAD08 attached. All waiting is done on the tokio
//! clock, so tests can drive it with paused time.
//!
//! # Features
//!
//! - Per-axis [`MotionProfile`]s (stationary, ramp, sine) read out through
//!   16-bit counters that wrap exactly like the hardware
//! - Redundant Z channel pair, with [`FaultScenario::CorruptChannel`] to
//!   force disagreements
//! - `-1` write cursor before the first scan, circular buffer laps and
//!   transfer counts
//! - Start, snapshot and spontaneous-stop fault injection
//! - Seeded counter noise ([`MockRng`])
//!
//! ```rust,no_run
//! use usbquad_core::Axis;
//! use usbquad_driver_mock::{MockMode, MotionProfile, SimulatedCounterBank};
//!
//! # fn main() -> usbquad_core::Result<()> {
//! let bank = SimulatedCounterBank::builder()
//!     .mode(MockMode::Realistic)
//!     .profile(Axis::X, MotionProfile::ramp(0.0, 25.0))
//!     .profile(Axis::Z, MotionProfile::sine(8.0, 4.0, 2.0))
//!     .build()?;
//! # drop(bank);
//! # Ok(())
//! # }
//! ```

pub mod common;
mod counter_bank;
mod motion;

// Re-export common types
pub use common::{FaultScenario, MockMode, MockRng};

pub use counter_bank::{CounterBankBuilder, CounterBankConfig, SimulatedCounterBank};
pub use motion::{counter_value, position_to_ticks, MotionProfile, COUNTER_MODULUS};
