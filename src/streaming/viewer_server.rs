//! TCP server attaching viewers to streams.
//!
//! ## Handshake
//!
//! ```text
//! viewer                               server
//!   │── frame("attitude") ──────────────▶│  subscribe TcpViewer
//!   │◀──────────── frame(32 B sample) ───│  per published message
//!   │◀──────────── frame(32 B sample) ───│
//!   │── close ──────────────────────────▶│  unsubscribe (last one stops worker)
//! ```
//!
//! | Stream      | Behaviour                                          |
//! |-------------|----------------------------------------------------|
//! | `data`      | subscribe; starts the ingress listener if stopped |
//! | `attitude`  | subscribe                                          |
//! | `radiation` | subscribe                                          |
//! | `post`      | one frame with the text report, then close         |
//!
//! Every connection gets its own thread: it performs the handshake and then
//! watches the socket until the viewer disconnects.

use super::tcp_viewer::TcpViewer;
use super::wire::{MAX_CLIENT_FRAME, frame, read_frame};
use crate::broadcast::{BroadcastChannel, ChannelRegistry, Subscriber, stream};
use crate::config::ViewerConfig;
use crate::error::{Error, Result};
use crate::ingress::{IngressListener, TextReport};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Time a new connection has to name its stream
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout while watching an attached viewer for disconnect
const WATCH_POLL: Duration = Duration::from_millis(200);

/// Sleep between accept attempts when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Everything a connection thread needs
struct Shared {
    registry: Arc<ChannelRegistry>,
    report: Arc<TextReport>,
    ingress: Arc<IngressListener>,
    write_timeout: Duration,
    running: Arc<AtomicBool>,
}

/// Accepts viewer connections until its running flag clears
pub struct ViewerServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl ViewerServer {
    pub fn bind(
        config: &ViewerConfig,
        registry: Arc<ChannelRegistry>,
        report: Arc<TextReport>,
        ingress: Arc<IngressListener>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address).map_err(|e| {
            Error::Other(format!("Failed to bind to {}: {}", config.bind_address, e))
        })?;
        if let Err(e) = listener.set_nonblocking(true) {
            log::warn!("Failed to set nonblocking mode: {}", e);
        }
        log::info!("Viewer server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                registry,
                report,
                ingress,
                write_timeout: Duration::from_millis(config.write_timeout_ms),
                running,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; returns once the running flag is cleared
    pub fn run(&self) {
        while self.shared.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((conn, addr)) => {
                    log::info!("Viewer connected: {}", addr);
                    let shared = Arc::clone(&self.shared);
                    let spawned = thread::Builder::new()
                        .name("viewer-conn".to_string())
                        .spawn(move || {
                            if let Err(e) = serve_connection(&shared, conn, addr) {
                                log::warn!("Viewer {}: {}", addr, e);
                            }
                            log::info!("Viewer disconnected: {}", addr);
                        });
                    if let Err(e) = spawned {
                        log::error!("Failed to spawn viewer thread for {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                }
            }
        }
        log::info!("Viewer server stopped");
    }

    /// Run the accept loop on its own thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("viewer-server".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }
}

/// Handshake, then either answer once (`post`) or attach and watch
fn serve_connection(shared: &Shared, mut conn: TcpStream, addr: SocketAddr) -> Result<()> {
    conn.set_nonblocking(false)?;
    conn.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let request = read_frame(&mut conn, MAX_CLIENT_FRAME)?;
    let name = String::from_utf8_lossy(&request).trim().to_string();
    log::debug!("Viewer {} requested stream '{}'", addr, name);

    if name == stream::POST {
        let text = shared.report.snapshot();
        conn.write_all(&frame(text.as_bytes()))?;
        let _ = conn.shutdown(Shutdown::Both);
        return Ok(());
    }

    let Some(channel) = shared.registry.get(&name) else {
        let _ = conn.shutdown(Shutdown::Both);
        return Err(Error::UnknownStream(name));
    };

    if name == stream::DATA {
        match shared.ingress.start() {
            Ok(outcome) => log::debug!("Ingress on data viewer attach: {:?}", outcome),
            Err(e) => log::error!("Failed to start ingress listener: {}", e),
        }
    }

    let viewer = Arc::new(TcpViewer::new(conn.try_clone()?, shared.write_timeout)?);
    channel.subscribe(Arc::clone(&viewer) as Arc<dyn Subscriber>)?;
    log::info!("Viewer {} attached to '{}'", addr, name);

    watch(shared, &channel, &viewer, conn);

    channel.unsubscribe(viewer.id());
    viewer.close();
    Ok(())
}

/// Block until the viewer hangs up, delivery fails, or the server stops
fn watch(shared: &Shared, channel: &BroadcastChannel, viewer: &TcpViewer, mut conn: TcpStream) {
    if let Err(e) = conn.set_read_timeout(Some(WATCH_POLL)) {
        log::warn!("Viewer {}: cannot set read timeout: {}", viewer.peer(), e);
        return;
    }
    let mut scratch = [0u8; 64];
    while shared.running.load(Ordering::Relaxed)
        && !viewer.is_closed()
        && channel.is_subscribed(viewer.id())
    {
        match conn.read(&mut scratch) {
            Ok(0) => break,
            // Viewers have nothing more to say after the handshake
            Ok(_) => continue,
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                log::debug!("Viewer {} read error: {}", viewer.peer(), e);
                break;
            }
        }
    }
}
