//! Common infrastructure for the simulated counter bank.
//!
//! - **mode**: how fast simulated time advances
//! - **faults**: fault injection scenarios
//! - **rng**: seeded random number generator for counter noise

pub mod faults;
pub mod mode;
pub mod rng;

pub use faults::FaultScenario;
pub use mode::MockMode;
pub use rng::MockRng;
