//! Local sensor processing: attitude fusion and radiation counting.
//!
//! - [`attitude`]: complementary filter over raw IMU registers
//! - [`radiation`]: per-interval pulse tally with raw timestamp log
//! - [`sampler`]: threads turning sensor streams into channel messages
//! - `mock`: simulated IMU and Geiger counter (feature `mock`)

pub mod attitude;
#[cfg(feature = "mock")]
pub mod mock;
pub mod radiation;
pub mod sampler;

pub use attitude::{Attitude, AttitudeFilter, RawAttitudeSample};
pub use radiation::{PulseLog, RadiationCounter};
pub use sampler::{AttitudeSampler, RadiationSampler, TimedAttitudeSample};
