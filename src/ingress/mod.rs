//! Network-delivered telemetry feed.
//!
//! - [`listener::IngressListener`]: the single UDP receive thread
//! - [`demux::IngressDemux`]: header decoding and routing
//! - [`report::TextReport`]: POST text accumulator

pub mod demux;
pub mod listener;
pub mod report;

pub use demux::{
    DatagramSource, DemuxState, IngressDemux, IngressStats, Route, RoutingCodes, StopReason, route,
};
pub use listener::{IngressListener, StartOutcome};
pub use report::TextReport;
