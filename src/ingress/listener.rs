//! UDP ingress listener.
//!
//! Owns the single datagram receive thread of the process. The listener is
//! started on demand (first `data` viewer, or at boot with `autostart`) and
//! stops on an EXIT datagram, a socket failure, or [`IngressListener::stop`].
//!
//! # Session Lifecycle
//!
//! ```text
//! 1. start(): reset text report, bind UDP port, spawn "ingress" thread
//! 2. thread: IngressDemux::run() until EXIT / error / cancellation
//! 3. thread clears the running flag on the way out
//! 4. start() may be called again for a new session
//! ```
//!
//! `std::net::UdpSocket` cannot be closed from another thread, so a pending
//! receive is unblocked two ways: the socket has a short read timeout, and
//! `stop()` sends an EXIT datagram to the bound port over loopback.

use super::demux::{IngressDemux, IngressStats, StopReason};
use super::report::TextReport;
use crate::broadcast::BroadcastChannel;
use crate::config::IngressConfig;
use crate::error::Result;
use crate::streaming::wire::encode_header;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receive timeout so the running flag is checked regularly
const RECV_POLL: Duration = Duration::from_millis(100);

/// Result of [`IngressListener::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct Session {
    handle: JoinHandle<IngressStats>,
    local_addr: SocketAddr,
}

/// The process's one datagram listener
pub struct IngressListener {
    config: IngressConfig,
    data: Arc<BroadcastChannel>,
    report: Arc<TextReport>,
    running: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
}

impl IngressListener {
    pub fn new(
        config: IngressConfig,
        data: Arc<BroadcastChannel>,
        report: Arc<TextReport>,
    ) -> Self {
        Self {
            config,
            data,
            report,
            running: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address of the current (or last) session's socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.lock().as_ref().map(|s| s.local_addr)
    }

    pub fn report(&self) -> &Arc<TextReport> {
        &self.report
    }

    /// Begin a new session; a no-op if one is already running
    pub fn start(&self) -> Result<StartOutcome> {
        let mut session = self.session.lock();
        if self.running.load(Ordering::SeqCst) {
            log::info!("Ingress listener is already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // Reap the previous session's thread (already finished)
        if let Some(previous) = session.take() {
            let _ = previous.handle.join();
        }

        self.report.reset();

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.config.port))?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let local_addr = socket.local_addr()?;

        log::info!(
            "Ingress listening on {} (payload_size={}, data={}, post={}, exit={})",
            local_addr,
            self.config.payload_size,
            self.config.data_code,
            self.config.post_code,
            self.config.exit_code
        );

        self.running.store(true, Ordering::SeqCst);
        let mut demux = IngressDemux::new(
            &self.config,
            Arc::clone(&self.data),
            Arc::clone(&self.report),
            Arc::clone(&self.running),
        );
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("ingress".to_string())
            .spawn(move || {
                let mut socket = socket;
                let reason = demux.run(&mut socket);
                running.store(false, Ordering::SeqCst);
                let stats = demux.stats();
                match reason {
                    StopReason::ExitCode => log::info!("Ingress stopped by EXIT code"),
                    StopReason::Cancelled => log::info!("Ingress stopped"),
                    StopReason::Transport(e) => {
                        log::error!("Ingress stopped on socket error: {}", e)
                    }
                }
                log::info!(
                    "Ingress session: {} datagrams ({} data, {} post, {} ignored, {} malformed)",
                    stats.received,
                    stats.data,
                    stats.post,
                    stats.ignored,
                    stats.malformed
                );
                stats
            });

        match spawned {
            Ok(handle) => {
                *session = Some(Session { handle, local_addr });
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// End the current session and wait for the thread to exit
    ///
    /// Returns the session's counters, or `None` if no session was active.
    pub fn stop(&self) -> Option<IngressStats> {
        let session = self.session.lock().take()?;
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            self.wake(session.local_addr);
        }
        session.handle.join().ok()
    }

    /// Unblock a pending receive by sending EXIT to ourselves
    fn wake(&self, local_addr: SocketAddr) {
        let target = if local_addr.ip().is_unspecified() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local_addr.port())
        } else {
            local_addr
        };
        let result = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .and_then(|s| s.send_to(&encode_header(self.config.exit_code, 0), target));
        if let Err(e) = result {
            log::debug!("Ingress wake-up send failed (timeout will apply): {}", e);
        }
    }
}

impl Drop for IngressListener {
    fn drop(&mut self) {
        self.stop();
    }
}
