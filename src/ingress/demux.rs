//! Datagram demultiplexer.
//!
//! Routes each inbound datagram by its header code:
//!
//! | Code | Action |
//! |------|--------|
//! | `data_code` | publish `payload[4..4+length]` to the `data` channel |
//! | `post_code` | append the trimmed text to the report |
//! | `exit_code` | end the session |
//! | anything else | ignored |
//!
//! # State Machine
//!
//! ```text
//! Idle ──recv──▶ Receiving ──datagram──▶ Routing ──▶ Idle
//!                    │                      │
//!                    └── transport error    └── EXIT
//!                          / cancelled  ──▶ Stopped
//! ```
//!
//! A malformed datagram is logged and dropped; only EXIT, a transport
//! failure or cancellation reach `Stopped`.

use super::report::TextReport;
use crate::broadcast::BroadcastChannel;
use crate::config::IngressConfig;
use crate::error::{Error, Result};
use crate::streaming::wire::{HEADER_LEN, decode_header};
use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Anything that yields whole datagrams
pub trait DatagramSource {
    /// Block until one datagram is copied into `buf`; returns its length
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl DatagramSource for UdpSocket {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_from(buf).map(|(len, _src)| len)
    }
}

/// Codes that select a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingCodes {
    pub data: i16,
    pub post: i16,
    pub exit: i16,
}

impl From<&IngressConfig> for RoutingCodes {
    fn from(config: &IngressConfig) -> Self {
        Self {
            data: config.data_code,
            post: config.post_code,
            exit: config.exit_code,
        }
    }
}

/// Where a datagram goes
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Data(&'a [u8]),
    Post(String),
    Exit,
    Ignored(i16),
}

/// Decode and classify one datagram without side effects
pub fn route<'a>(datagram: &'a [u8], codes: &RoutingCodes) -> Result<Route<'a>> {
    let header = decode_header(datagram)?;
    let body = &datagram[HEADER_LEN..];

    // Only DATA slices by the declared length; POST and EXIT ignore it
    let route = if header.code == codes.data {
        let length = usize::try_from(header.length)
            .ok()
            .filter(|&length| length <= body.len())
            .ok_or(Error::LengthOutOfRange {
                length: header.length,
                available: body.len(),
            })?;
        Route::Data(&body[..length])
    } else if header.code == codes.post {
        Route::Post(post_text(body))
    } else if header.code == codes.exit {
        Route::Exit
    } else {
        Route::Ignored(header.code)
    };
    Ok(route)
}

/// POST bodies are padded text; drop trailing whitespace and NUL/control padding
fn post_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .trim_end_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}

/// Demultiplexer states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    Idle,
    Receiving,
    Routing,
    Stopped,
}

/// Why the receive loop ended
#[derive(Debug)]
pub enum StopReason {
    /// EXIT-coded datagram received
    ExitCode,
    /// Running flag cleared
    Cancelled,
    /// Socket failed
    Transport(io::Error),
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub received: u64,
    pub data: u64,
    pub post: u64,
    pub ignored: u64,
    pub malformed: u64,
}

/// Whether the loop should keep going after a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Routes datagrams into the `data` channel and the text report
pub struct IngressDemux {
    codes: RoutingCodes,
    payload_size: usize,
    data: Arc<BroadcastChannel>,
    report: Arc<TextReport>,
    running: Arc<AtomicBool>,
    state: DemuxState,
    stats: IngressStats,
}

impl IngressDemux {
    pub fn new(
        config: &IngressConfig,
        data: Arc<BroadcastChannel>,
        report: Arc<TextReport>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            codes: RoutingCodes::from(config),
            payload_size: config.payload_size.max(HEADER_LEN),
            data,
            report,
            running,
            state: DemuxState::Idle,
            stats: IngressStats::default(),
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    pub fn stats(&self) -> IngressStats {
        self.stats
    }

    /// Route one datagram; malformed input is logged and dropped
    pub fn handle_datagram(&mut self, datagram: &[u8]) -> Flow {
        self.stats.received += 1;
        match route(datagram, &self.codes) {
            Ok(Route::Data(payload)) => {
                self.stats.data += 1;
                log::trace!("DATA datagram: {} bytes", payload.len());
                self.data.publish(payload);
                Flow::Continue
            }
            Ok(Route::Post(text)) => {
                self.stats.post += 1;
                log::debug!("POST line: {}", text);
                self.report.append_line(&text);
                Flow::Continue
            }
            Ok(Route::Exit) => {
                log::info!("EXIT datagram received");
                Flow::Exit
            }
            Ok(Route::Ignored(code)) => {
                self.stats.ignored += 1;
                log::debug!("Ignoring datagram with unknown code {}", code);
                Flow::Continue
            }
            Err(e) => {
                self.stats.malformed += 1;
                log::warn!("Dropping datagram ({} bytes): {}", datagram.len(), e);
                Flow::Continue
            }
        }
    }

    /// Receive and route until EXIT, cancellation or transport failure
    ///
    /// Read timeouts on the source are treated as idle ticks so the running
    /// flag is re-checked regularly.
    pub fn run<S: DatagramSource>(&mut self, source: &mut S) -> StopReason {
        let mut buffer = vec![0u8; self.payload_size];

        loop {
            if !self.running.load(Ordering::Relaxed) {
                self.state = DemuxState::Stopped;
                return StopReason::Cancelled;
            }

            self.state = DemuxState::Receiving;
            let len = match source.recv_datagram(&mut buffer) {
                Ok(len) => len,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    self.state = DemuxState::Idle;
                    continue;
                }
                Err(e) => {
                    log::error!("Ingress receive failed: {}", e);
                    self.state = DemuxState::Stopped;
                    return StopReason::Transport(e);
                }
            };

            self.state = DemuxState::Routing;
            if self.handle_datagram(&buffer[..len]) == Flow::Exit {
                self.state = DemuxState::Stopped;
                return StopReason::ExitCode;
            }
            self.state = DemuxState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::wire::{encode_datagram, encode_header};
    use std::collections::VecDeque;

    /// Replays scripted datagrams, then reports a closed transport
    struct ScriptedSource {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedSource {
        fn new(datagrams: Vec<Vec<u8>>) -> Self {
            Self {
                script: datagrams.into_iter().map(Ok).collect(),
            }
        }
    }

    impl DatagramSource for ScriptedSource {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    let len = bytes.len().min(buf.len());
                    buf[..len].copy_from_slice(&bytes[..len]);
                    Ok(len)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "script exhausted",
                )),
            }
        }
    }

    fn codes() -> RoutingCodes {
        RoutingCodes::from(&IngressConfig::default())
    }

    fn demux() -> (IngressDemux, Arc<BroadcastChannel>, Arc<TextReport>) {
        let config = IngressConfig::default();
        let data = BroadcastChannel::new("data", 16);
        let report = Arc::new(TextReport::new(
            config.report_banner.clone(),
            config.line_terminator.clone(),
        ));
        let running = Arc::new(AtomicBool::new(true));
        let demux = IngressDemux::new(&config, Arc::clone(&data), Arc::clone(&report), running);
        (demux, data, report)
    }

    #[test]
    fn test_route_data_uses_declared_length() {
        let mut dgram = encode_header(1, 3).to_vec();
        dgram.extend_from_slice(b"abcdef");
        assert_eq!(route(&dgram, &codes()).unwrap(), Route::Data(b"abc"));
    }

    #[test]
    fn test_route_post_trims_padding() {
        let mut dgram = encode_header(0, 0).to_vec();
        dgram.extend_from_slice(b"battery ok  \r\n\0\0\0");
        assert_eq!(
            route(&dgram, &codes()).unwrap(),
            Route::Post("battery ok".to_string())
        );
    }

    #[test]
    fn test_route_exit_and_unknown() {
        assert_eq!(route(&encode_header(-1, 0), &codes()).unwrap(), Route::Exit);
        assert_eq!(
            route(&encode_header(99, 0), &codes()).unwrap(),
            Route::Ignored(99)
        );
    }

    #[test]
    fn test_route_rejects_bad_lengths() {
        let mut dgram = encode_header(1, 10).to_vec();
        dgram.extend_from_slice(b"abc");
        assert!(matches!(
            route(&dgram, &codes()),
            Err(Error::LengthOutOfRange {
                length: 10,
                available: 3
            })
        ));
        assert!(matches!(
            route(&encode_header(1, -4), &codes()),
            Err(Error::LengthOutOfRange { .. })
        ));
        assert!(matches!(
            route(&[1, 0], &codes()),
            Err(Error::MalformedHeader { available: 2 })
        ));
    }

    #[test]
    fn test_post_and_exit_ignore_declared_length() {
        // Stale length fields that overrun the body
        assert_eq!(route(&encode_header(-1, 5), &codes()).unwrap(), Route::Exit);
        assert_eq!(route(&encode_header(-1, -3), &codes()).unwrap(), Route::Exit);

        let mut post = encode_header(0, 400).to_vec();
        post.extend_from_slice(b"gps lock\0\0");
        assert_eq!(
            route(&post, &codes()).unwrap(),
            Route::Post("gps lock".to_string())
        );
        assert_eq!(
            route(&encode_header(99, 50), &codes()).unwrap(),
            Route::Ignored(99)
        );
    }

    #[test]
    fn test_exit_with_stale_length_stops_loop() {
        let (mut demux, data, report) = demux();
        let mut post = encode_header(0, 300).to_vec();
        post.extend_from_slice(b"self test passed");
        let mut source = ScriptedSource::new(vec![
            post,
            encode_header(-1, 12).to_vec(),
            encode_datagram(1, b"late"),
        ]);

        assert!(matches!(demux.run(&mut source), StopReason::ExitCode));
        assert!(report.snapshot().ends_with("self test passed<br>"));
        assert_eq!(demux.stats().malformed, 0);
        assert_eq!(data.queued(), 0);
        assert_eq!(source.script.len(), 1);
    }

    #[test]
    fn test_data_post_exit_stream() {
        let (mut demux, data, report) = demux();
        let mut source = ScriptedSource::new(vec![
            encode_datagram(1, b"P"),
            encode_datagram(0, b"hi"),
            encode_datagram(-1, b""),
            // Never reached
            encode_datagram(1, b"late"),
        ]);

        let reason = demux.run(&mut source);
        assert!(matches!(reason, StopReason::ExitCode));
        assert_eq!(demux.state(), DemuxState::Stopped);

        let pending = data.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(&*pending[0], b"P");
        assert_eq!(data.stats().published, 1);
        assert!(report.snapshot().ends_with("hi<br>"));
        assert_eq!(source.script.len(), 1);
    }

    #[test]
    fn test_malformed_does_not_stop_loop() {
        let (mut demux, data, _report) = demux();
        let mut lying = encode_header(1, 500).to_vec();
        lying.extend_from_slice(b"short");
        let mut source = ScriptedSource::new(vec![
            lying,
            vec![1, 0],
            encode_datagram(1, b"good"),
            encode_datagram(-1, b""),
        ]);

        assert!(matches!(demux.run(&mut source), StopReason::ExitCode));
        let pending = data.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(&*pending[0], b"good");
        assert_eq!(demux.stats().malformed, 2);
        assert_eq!(demux.stats().received, 4);
    }

    #[test]
    fn test_unknown_codes_ignored() {
        let (mut demux, data, _report) = demux();
        let mut source = ScriptedSource::new(vec![
            encode_datagram(42, b"future"),
            encode_datagram(-1, b""),
        ]);
        assert!(matches!(demux.run(&mut source), StopReason::ExitCode));
        assert_eq!(data.queued(), 0);
        assert_eq!(demux.stats().ignored, 1);
    }

    #[test]
    fn test_timeouts_are_not_fatal() {
        let (mut demux, data, _report) = demux();
        let mut source = ScriptedSource {
            script: VecDeque::from(vec![
                Err(io::Error::new(io::ErrorKind::WouldBlock, "timeout")),
                Ok(encode_datagram(1, b"x")),
                Ok(encode_datagram(-1, b"")),
            ]),
        };
        assert!(matches!(demux.run(&mut source), StopReason::ExitCode));
        assert_eq!(data.queued(), 1);
    }

    #[test]
    fn test_transport_failure_stops() {
        let (mut demux, _data, _report) = demux();
        let mut source = ScriptedSource::new(vec![encode_datagram(1, b"x")]);
        match demux.run(&mut source) {
            StopReason::Transport(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted),
            other => panic!("expected transport failure, got {:?}", other),
        }
        assert_eq!(demux.state(), DemuxState::Stopped);
    }

    #[test]
    fn test_cleared_flag_cancels() {
        let config = IngressConfig::default();
        let data = BroadcastChannel::new("data", 3);
        let report = Arc::new(TextReport::new("", "<br>"));
        let running = Arc::new(AtomicBool::new(false));
        let mut demux = IngressDemux::new(&config, data, report, running);
        let mut source = ScriptedSource::new(vec![encode_datagram(1, b"x")]);
        assert!(matches!(demux.run(&mut source), StopReason::Cancelled));
    }
}
