//! Sensor sampler threads feeding the broadcast channels.
//!
//! ```text
//! IMU source ──TimedAttitudeSample──► AttitudeSampler ──32 B──► "attitude"
//!                                      (AttitudeFilter)
//!
//! Geiger source ──Instant──► RadiationSampler ──4 B count / interval──► "radiation"
//!                             (RadiationCounter, tick)
//! ```
//!
//! Sources hand samples over `crossbeam_channel` so a real driver, the mock
//! simulator, or a test can drive the same sampler.

use super::attitude::{AttitudeFilter, RawAttitudeSample};
use super::radiation::RadiationCounter;
use crate::broadcast::BroadcastChannel;
use crate::error::Result;
use crate::streaming::wire::encode_count;
use crossbeam_channel::{Receiver, RecvTimeoutError, never, select, tick};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often idle sampler loops re-check their running flag
const POLL: Duration = Duration::from_millis(50);

/// One IMU reading with the time it was taken
#[derive(Debug, Clone, Copy)]
pub struct TimedAttitudeSample {
    pub raw: RawAttitudeSample,
    pub at: Instant,
}

impl TimedAttitudeSample {
    pub fn new(raw: RawAttitudeSample, at: Instant) -> Self {
        Self { raw, at }
    }

    pub fn now(raw: RawAttitudeSample) -> Self {
        Self::new(raw, Instant::now())
    }
}

/// Runs the attitude filter over a sample stream
pub struct AttitudeSampler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl AttitudeSampler {
    pub fn spawn(
        mut filter: AttitudeFilter,
        source: Receiver<TimedAttitudeSample>,
        channel: Arc<BroadcastChannel>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("attitude-sampler".to_string())
            .spawn(move || {
                log::info!("Attitude sampler started (A={})", filter.accel_weight());
                let mut published = 0u64;
                while flag.load(Ordering::Relaxed) {
                    match source.recv_timeout(POLL) {
                        Ok(sample) => {
                            let attitude = filter.sample(&sample.raw, sample.at);
                            log::trace!(
                                "roll={:.4} pitch={:.4} temp={:.2}",
                                attitude.roll,
                                attitude.pitch,
                                attitude.temperature
                            );
                            channel.publish(attitude.to_bytes());
                            published += 1;
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            log::info!("Attitude source disconnected");
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::Relaxed);
                log::info!("Attitude sampler stopped after {} samples", published);
                published
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the thread and return how many samples it published
    pub fn stop(&mut self) -> Option<u64> {
        self.running.store(false, Ordering::Relaxed);
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl Drop for AttitudeSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Publishes the pulse tally once per interval
pub struct RadiationSampler {
    running: Arc<AtomicBool>,
    counter: Arc<RadiationCounter>,
    handle: Option<JoinHandle<u64>>,
}

impl RadiationSampler {
    /// `pulses` may disconnect; the counter keeps being reported either way
    pub fn spawn(
        counter: Arc<RadiationCounter>,
        pulses: Receiver<Instant>,
        interval: Duration,
        channel: Arc<BroadcastChannel>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let tally = Arc::clone(&counter);

        let handle = thread::Builder::new()
            .name("radiation-sampler".to_string())
            .spawn(move || {
                log::info!("Radiation sampler started (interval={:?})", interval);
                let ticker = tick(interval);
                let mut pulses = pulses;
                let mut reports = 0u64;

                while flag.load(Ordering::Relaxed) {
                    select! {
                        recv(pulses) -> pulse => match pulse {
                            Ok(at) => tally.record_pulse(at),
                            Err(_) => {
                                log::info!("Pulse source disconnected");
                                pulses = never();
                            }
                        },
                        recv(ticker) -> _ => {
                            let count = tally.take_count();
                            log::trace!("radiation count={}", count);
                            channel.publish(encode_count(i32::try_from(count).unwrap_or(i32::MAX)));
                            reports += 1;
                        },
                        default(POLL) => {}
                    }
                }
                tally.flush();
                log::info!("Radiation sampler stopped after {} reports", reports);
                reports
            })?;

        Ok(Self {
            running,
            counter,
            handle: Some(handle),
        })
    }

    pub fn counter(&self) -> &Arc<RadiationCounter> {
        &self.counter
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the thread and return how many counts it published
    pub fn stop(&mut self) -> Option<u64> {
        self.running.store(false, Ordering::Relaxed);
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl Drop for RadiationSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
