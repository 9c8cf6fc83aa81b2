//! Bounded broadcast channel with drop-oldest backpressure.
//!
//! One channel exists per logical stream (`data`, `attitude`, `radiation`).
//! Producers call [`BroadcastChannel::publish`], which never blocks. A
//! dedicated delivery worker drains the queue and fans each message out to
//! every current subscriber.
//!
//! # Lifecycle
//!
//! ```text
//!            first subscribe                 last unsubscribe
//! stopped ─────────────────────▶ running ─────────────────────▶ stopped
//!                               (worker)     (queue cleared)
//! ```
//!
//! The worker exists only while there is an audience. Restarting bumps an
//! epoch so a worker from a previous run exits even if it wakes late.
//!
//! # Locking
//!
//! The queue, the subscriber set and the lifecycle flags share one mutex.
//! The worker snapshots the subscriber set under that lock and sends
//! outside it, so a slow viewer never blocks `publish` or `subscribe`.

use super::subscriber::{Message, Subscriber, SubscriberId};
use crate::error::Result;
use log::{debug, info, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Result of a publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Message queued without loss
    Queued,
    /// Queue was full; the oldest message was evicted to make room
    DroppedOldest,
}

/// Counters for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub published: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub workers_started: u64,
}

struct ChannelState {
    queue: VecDeque<Message>,
    subscribers: Vec<Arc<dyn Subscriber>>,
    running: bool,
    epoch: u64,
    worker: Option<JoinHandle<()>>,
}

/// Named broadcast stream with its own subscribers and delivery worker
pub struct BroadcastChannel {
    name: String,
    capacity: usize,
    state: Mutex<ChannelState>,
    available: Condvar,
    published: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
    workers_started: AtomicU64,
}

impl BroadcastChannel {
    /// Create a stopped channel holding at most `capacity` queued messages
    ///
    /// A capacity of zero is treated as one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            name: name.into(),
            capacity,
            state: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(capacity),
                subscribers: Vec::new(),
                running: false,
                epoch: 0,
                worker: None,
            }),
            available: Condvar::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            workers_started: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue a message for delivery. Never blocks on consumers.
    pub fn publish(&self, message: impl Into<Message>) -> PublishOutcome {
        let message = message.into();
        let outcome = {
            let mut state = self.state.lock();
            // Evict and insert under the same lock so the queue never exceeds capacity
            let outcome = if state.queue.len() >= self.capacity {
                state.queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::DroppedOldest
            } else {
                PublishOutcome::Queued
            };
            state.queue.push_back(message);
            outcome
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        self.available.notify_all();

        if outcome == PublishOutcome::DroppedOldest {
            trace!("[{}] queue full, dropped oldest message", self.name);
        }
        outcome
    }

    /// Attach a subscriber, starting the delivery worker if this is the first
    ///
    /// Returns `Ok(false)` if a subscriber with the same id is already attached.
    pub fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn Subscriber>) -> Result<bool> {
        let mut state = self.state.lock();
        let id = subscriber.id();
        if state.subscribers.iter().any(|s| s.id() == id) {
            return Ok(false);
        }
        let label = subscriber.describe();
        state.subscribers.push(subscriber);

        if !state.running {
            state.running = true;
            state.epoch += 1;
            let epoch = state.epoch;
            let channel = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name(format!("{}-broadcast", self.name))
                .spawn(move || channel.worker_loop(epoch));
            match spawned {
                Ok(handle) => {
                    // A previous worker was already told to exit; let it finish detached
                    let _previous = state.worker.replace(handle);
                    self.workers_started.fetch_add(1, Ordering::Relaxed);
                    info!("[{}] broadcast started (first subscriber {})", self.name, label);
                }
                Err(e) => {
                    state.subscribers.retain(|s| s.id() != id);
                    state.running = false;
                    return Err(e.into());
                }
            }
        } else {
            debug!(
                "[{}] subscriber {} attached ({} total)",
                self.name,
                label,
                state.subscribers.len()
            );
        }
        Ok(true)
    }

    /// Detach a subscriber; the last one out stops the worker and clears the queue
    ///
    /// Returns whether the subscriber was attached.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id() != id);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!("[{}] subscriber {} detached", self.name, id);
            if state.subscribers.is_empty() {
                self.stop_locked(&mut state);
            }
        }
        removed
    }

    /// Drop every subscriber, stop the worker and wait for it to exit
    pub fn shutdown(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.subscribers.clear();
            if state.running {
                self.stop_locked(&mut state);
            }
            state.worker.take()
        };
        if let Some(handle) = handle
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.state.lock().subscribers.iter().any(|s| s.id() == id)
    }

    /// Number of messages waiting for the worker
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Copy of the queued messages, oldest first
    pub fn pending(&self) -> Vec<Message> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Messages evicted by drop-oldest since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// How many times a delivery worker has been spawned
    pub fn workers_started(&self) -> u64 {
        self.workers_started.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
        }
    }

    fn stop_locked(&self, state: &mut ChannelState) {
        state.running = false;
        state.queue.clear();
        self.available.notify_all();
        info!("[{}] broadcast stopped (no subscribers)", self.name);
    }

    fn worker_loop(self: Arc<Self>, epoch: u64) {
        debug!("[{}] worker {} running", self.name, epoch);
        loop {
            let (message, targets) = {
                let mut state = self.state.lock();
                loop {
                    if !state.running || state.epoch != epoch {
                        debug!("[{}] worker {} exiting", self.name, epoch);
                        return;
                    }
                    if let Some(message) = state.queue.pop_front() {
                        break (message, state.subscribers.clone());
                    }
                    self.available.wait(&mut state);
                }
            };

            let mut failed = Vec::new();
            for subscriber in &targets {
                match subscriber.deliver(&message) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "[{}] delivery to {} failed, removing: {}",
                            self.name,
                            subscriber.describe(),
                            e
                        );
                        failed.push(subscriber.id());
                    }
                }
            }
            trace!(
                "[{}] delivered {} bytes to {} subscribers",
                self.name,
                message.len(),
                targets.len() - failed.len()
            );

            if !failed.is_empty() {
                let mut state = self.state.lock();
                state.subscribers.retain(|s| !failed.contains(&s.id()));
                // A stale worker may remove the last subscriber of a newer run
                if state.subscribers.is_empty() && state.running {
                    self.stop_locked(&mut state);
                }
            }
        }
    }
}
