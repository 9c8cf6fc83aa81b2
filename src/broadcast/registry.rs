//! Process-wide map from stream name to channel

use super::channel::BroadcastChannel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every broadcast channel in the process
///
/// Channels are created up front with [`ChannelRegistry::with_streams`] or
/// lazily on first use with [`ChannelRegistry::get_or_create`].
pub struct ChannelRegistry {
    capacity: usize,
    channels: Mutex<HashMap<String, Arc<BroadcastChannel>>>,
}

impl ChannelRegistry {
    /// Empty registry; new channels get `capacity` queue slots
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the named streams
    pub fn with_streams(capacity: usize, names: &[&str]) -> Self {
        let registry = Self::new(capacity);
        for name in names {
            registry.get_or_create(name);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<BroadcastChannel>> {
        self.channels.lock().get(name).cloned()
    }

    pub fn get_or_create(&self, name: &str) -> Arc<BroadcastChannel> {
        let mut channels = self.channels.lock();
        Arc::clone(
            channels
                .entry(name.to_string())
                .or_insert_with(|| BroadcastChannel::new(name, self.capacity)),
        )
    }

    /// Registered stream names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every channel and wait for the delivery workers to exit
    pub fn shutdown_all(&self) {
        let channels: Vec<Arc<BroadcastChannel>> =
            self.channels.lock().values().cloned().collect();
        for channel in channels {
            channel.shutdown();
        }
        log::info!("All broadcast channels stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{ForwardingSubscriber, stream};

    #[test]
    fn test_with_streams() {
        let registry = ChannelRegistry::with_streams(3, &[stream::DATA, stream::ATTITUDE]);
        assert_eq!(registry.names(), vec!["attitude", "data"]);
        assert!(registry.get(stream::RADIATION).is_none());
        assert_eq!(registry.get(stream::DATA).unwrap().capacity(), 3);
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = ChannelRegistry::new(5);
        let a = registry.get_or_create("radiation");
        let b = registry.get_or_create("radiation");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.capacity(), 5);
    }

    #[test]
    fn test_channels_are_independent() {
        let registry = ChannelRegistry::with_streams(3, &[stream::DATA, stream::ATTITUDE]);
        let data = registry.get(stream::DATA).unwrap();
        let attitude = registry.get(stream::ATTITUDE).unwrap();

        let (sub, _rx) = ForwardingSubscriber::unbounded();
        data.subscribe(sub).unwrap();
        assert!(data.is_running());
        assert!(!attitude.is_running());

        registry.shutdown_all();
        assert!(!data.is_running());
    }
}
