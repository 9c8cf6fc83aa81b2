//! Viewer connection as a broadcast subscriber

use super::wire::frame;
use crate::broadcast::{Message, Subscriber, SubscriberId};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One connected viewer. Each delivered message is written as one frame.
///
/// A write that fails or exceeds the write timeout marks the viewer closed;
/// the channel then drops it and the connection's watcher thread exits.
pub struct TcpViewer {
    id: SubscriberId,
    peer: SocketAddr,
    stream: Mutex<TcpStream>,
    closed: AtomicBool,
}

impl TcpViewer {
    pub fn new(stream: TcpStream, write_timeout: Duration) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        // A zero timeout is rejected by the OS, treat it as "no timeout"
        stream.set_write_timeout((!write_timeout.is_zero()).then_some(write_timeout))?;
        Ok(Self {
            id: SubscriberId::next(),
            peer,
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Close the socket; pending and future deliveries fail
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            let _ = self.stream.lock().shutdown(Shutdown::Both);
        }
    }
}

impl Subscriber for TcpViewer {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Delivery(format!("viewer {} is closed", self.peer)));
        }
        let mut stream = self.stream.lock();
        if let Err(e) = stream.write_all(&frame(message)) {
            self.closed.store(true, Ordering::Relaxed);
            let _ = stream.shutdown(Shutdown::Both);
            return Err(Error::Delivery(format!("viewer {}: {}", self.peer, e)));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.id, self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::wire::read_frame;
    use std::net::TcpListener;
    use std::sync::Arc;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_deliver_writes_frames() {
        let (server, mut client) = pair();
        let viewer = TcpViewer::new(server, Duration::from_millis(500)).unwrap();

        let first: Message = Arc::from(&b"abc"[..]);
        let second: Message = Arc::from(&[1u8, 2, 3, 4][..]);
        viewer.deliver(&first).unwrap();
        viewer.deliver(&second).unwrap();

        assert_eq!(read_frame(&mut client, 64).unwrap(), b"abc");
        assert_eq!(read_frame(&mut client, 64).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_closed_viewer_fails_delivery() {
        let (server, _client) = pair();
        let viewer = TcpViewer::new(server, Duration::from_millis(500)).unwrap();
        viewer.close();
        assert!(viewer.is_closed());

        let message: Message = Arc::from(&b"x"[..]);
        assert!(matches!(viewer.deliver(&message), Err(Error::Delivery(_))));
    }

    #[test]
    fn test_describe_names_peer() {
        let (server, client) = pair();
        let viewer = TcpViewer::new(server, Duration::ZERO).unwrap();
        assert_eq!(viewer.peer(), client.local_addr().unwrap());
        assert!(viewer.describe().contains(&viewer.peer().to_string()));
    }
}
