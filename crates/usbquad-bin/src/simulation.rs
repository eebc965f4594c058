//! Simulated counter bank driven by the `run` command.

use usbquad_core::{Axis, ReaderConfig, Result};
use usbquad_driver_mock::{CounterBankBuilder, MockMode, MotionProfile, SimulatedCounterBank};

/// Counter noise applied to every channel, in ticks.
pub const NOISE_TICKS: u32 = 1;

/// A real-time bank matching `config`, moving all three axes.
///
/// X sweeps back and forth, Y travels far enough to wrap its counter within
/// ten seconds and Z oscillates inside a single wrap span.
pub fn counter_bank(config: &ReaderConfig, seed: Option<u64>) -> Result<SimulatedCounterBank> {
    let mut builder = CounterBankBuilder::matching(config)
        .mode(MockMode::Realistic)
        .profile(Axis::X, MotionProfile::sine(50.0, 40.0, 10.0))
        .profile(Axis::Y, MotionProfile::ramp(0.0, 30.0))
        .profile(Axis::Z, MotionProfile::sine(3.0, 2.0, 4.0))
        .extruder(MotionProfile::ramp(0.0, 500.0))
        .noise_ticks(NOISE_TICKS);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    builder.build()
}
