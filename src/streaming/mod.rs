//! Viewer-facing transport
//!
//! - [`wire`]: datagram header, sample encodings and TCP framing
//! - [`tcp_viewer`]: a viewer socket as a broadcast subscriber
//! - [`viewer_server`]: accept loop and per-connection handshake

pub mod tcp_viewer;
pub mod viewer_server;
pub mod wire;

pub use tcp_viewer::TcpViewer;
pub use viewer_server::ViewerServer;
