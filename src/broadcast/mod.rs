//! Fan-out of serialized messages to live subscribers.
//!
//! - [`BroadcastChannel`]: bounded drop-oldest queue + subscriber set + worker
//! - [`ChannelRegistry`]: name → channel map owned by the daemon
//! - [`Subscriber`]: what a viewer connection implements to receive messages

pub mod channel;
pub mod registry;
pub mod subscriber;

pub use channel::{BroadcastChannel, ChannelStats, PublishOutcome};
pub use registry::ChannelRegistry;
pub use subscriber::{ForwardingSubscriber, Message, Subscriber, SubscriberId};

/// Stream names shared by producers and the viewer server
pub mod stream {
    /// Binary payloads from DATA-coded datagrams
    pub const DATA: &str = "data";
    /// 32-byte fused attitude samples
    pub const ATTITUDE: &str = "attitude";
    /// 4-byte pulse counts
    pub const RADIATION: &str = "radiation";
    /// Text report snapshot (not a channel)
    pub const POST: &str = "post";

    /// Streams backed by a broadcast channel
    pub const CHANNELS: [&str; 3] = [DATA, ATTITUDE, RADIATION];
}
