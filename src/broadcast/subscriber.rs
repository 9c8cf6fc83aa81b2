//! Subscriber seam between channels and the connection layer

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable, already-serialized payload shared by every recipient
pub type Message = Arc<[u8]>;

/// Process-unique subscriber identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live receiver of channel messages (typically one viewer connection)
///
/// `deliver` is called from the channel's worker thread. An error marks the
/// subscriber as broken and the channel removes it.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    /// Push one message to this receiver
    fn deliver(&self, message: &Message) -> Result<()>;

    /// Human-readable name for logs
    fn describe(&self) -> String {
        self.id().to_string()
    }
}

/// Subscriber that forwards messages into a crossbeam channel
///
/// Used for in-process consumers. Delivery fails once the receiving end is
/// dropped or its buffer is full.
pub struct ForwardingSubscriber {
    id: SubscriberId,
    tx: Sender<Message>,
}

impl ForwardingSubscriber {
    /// Create a subscriber with an unbounded buffer
    pub fn unbounded() -> (Arc<Self>, Receiver<Message>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Arc::new(Self {
                id: SubscriberId::next(),
                tx,
            }),
            rx,
        )
    }

    /// Create a subscriber that fails delivery when `capacity` messages are pending
    pub fn bounded(capacity: usize) -> (Arc<Self>, Receiver<Message>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Arc::new(Self {
                id: SubscriberId::next(),
                tx,
            }),
            rx,
        )
    }
}

impl Subscriber for ForwardingSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, message: &Message) -> Result<()> {
        self.tx
            .try_send(Arc::clone(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => Error::Delivery("forwarding buffer full".to_string()),
                TrySendError::Disconnected(_) => {
                    Error::Delivery("forwarding receiver dropped".to_string())
                }
            })
    }

    fn describe(&self) -> String {
        format!("forwarder {}", self.id)
    }
}
