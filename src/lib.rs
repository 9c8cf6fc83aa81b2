//! Prasaran - Telemetry relay for a small robotic platform
//!
//! Receives an instrument datagram feed, fuses local IMU readings into an
//! attitude estimate, counts Geiger pulses, and fans every stream out to any
//! number of TCP viewers.
//!
//! ```text
//! UDP :1701 ──► ingress::IngressDemux ──DATA──► "data" ──────┐
//!                     │ POST                                  │
//!                     ▼                                       ▼
//!              ingress::TextReport ──────────────────► streaming::ViewerServer :1702
//!                                                             ▲
//! IMU ──► sensors::AttitudeSampler ────► "attitude" ──────────┤
//! Geiger ──► sensors::RadiationSampler ─► "radiation" ────────┘
//! ```
//!
//! ## Features
//!
//! - `mock` (default): simulated IMU and Geiger counter for running without hardware

pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingress;
pub mod sensors;
pub mod streaming;

// Re-export commonly used types
pub use broadcast::{BroadcastChannel, ChannelRegistry, Subscriber};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use ingress::{IngressListener, TextReport};
pub use sensors::{AttitudeFilter, RadiationCounter};
pub use streaming::ViewerServer;
