//! Hardware-free sensor sources.
//!
//! | Component     | Simulation Method                           |
//! |---------------|---------------------------------------------|
//! | IMU (MPU6050) | Sinusoidal sway + Gaussian register noise   |
//! | Geiger tube   | Poisson process (exponential inter-arrival) |
//!
//! # Simulation Loop
//!
//! ```text
//! Every 1/sample_rate_hz:
//! 1. Advance the IMU model, send a TimedAttitudeSample
//! 2. Send every Geiger pulse scheduled up to now
//! ```
//!
//! Both generators share one seed (`[sensors] random_seed`, 0 = random).
//! The loop ends when stopped or when the attitude receiver is dropped.

pub mod geiger_sim;
pub mod imu_sim;
pub mod noise;

pub use geiger_sim::MockGeiger;
pub use imu_sim::MockImu;
pub use noise::NoiseGenerator;

use super::sampler::TimedAttitudeSample;
use crate::config::{AttitudeConfig, SensorConfig};
use crate::error::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Samples buffered between the simulator and the samplers
const SOURCE_BUFFER: usize = 64;

/// Receiving ends handed to the samplers
pub struct MockStreams {
    pub attitude: Receiver<TimedAttitudeSample>,
    pub pulses: Receiver<Instant>,
}

/// Running simulation thread
pub struct MockSensors {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockSensors {
    pub fn start(sensors: &SensorConfig, attitude: &AttitudeConfig) -> Result<(Self, MockStreams)> {
        let (imu_tx, imu_rx) = bounded(SOURCE_BUFFER);
        let (pulse_tx, pulse_rx) = bounded(SOURCE_BUFFER);

        let noise = NoiseGenerator::new(sensors.random_seed);
        let now = Instant::now();
        let imu = MockImu::new(noise.clone(), sensors.mock_sway_deg, sensors.mock_noise_lsb);
        // Distinct stream from the IMU's so pulses are not correlated with noise
        let mut geiger_noise = noise;
        geiger_noise.uniform();
        let geiger = MockGeiger::new(geiger_noise, sensors.mock_pulse_rate, now);

        let interval = Duration::from_secs_f64(1.0 / attitude.sample_rate_hz.max(0.1));
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        log::info!(
            "Starting mock sensors: imu={:.1} Hz, geiger={:.2} cps, seed={}",
            attitude.sample_rate_hz,
            sensors.mock_pulse_rate,
            sensors.random_seed
        );

        let handle = thread::Builder::new()
            .name("mock-sensors".to_string())
            .spawn(move || simulation_loop(imu, geiger, interval, imu_tx, pulse_tx, flag))?;

        Ok((
            Self {
                running,
                handle: Some(handle),
            },
            MockStreams {
                attitude: imu_rx,
                pulses: pulse_rx,
            },
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockSensors {
    fn drop(&mut self) {
        self.stop();
    }
}

fn simulation_loop(
    mut imu: MockImu,
    mut geiger: MockGeiger,
    interval: Duration,
    imu_tx: Sender<TimedAttitudeSample>,
    pulse_tx: Sender<Instant>,
    running: Arc<AtomicBool>,
) {
    let mut last_time = Instant::now();
    let mut pulses_open = true;

    while running.load(Ordering::Relaxed) {
        let loop_start = Instant::now();
        let dt = loop_start.duration_since(last_time).as_secs_f64();
        last_time = loop_start;

        let sample = TimedAttitudeSample::new(imu.generate(dt), loop_start);
        // A full buffer means the sampler is behind; skip rather than block
        if let Err(TrySendError::Disconnected(_)) = imu_tx.try_send(sample) {
            break;
        }

        geiger.poll(loop_start, |at| {
            if pulses_open
                && let Err(TrySendError::Disconnected(_)) = pulse_tx.try_send(at)
            {
                pulses_open = false;
            }
        });

        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    running.store(false, Ordering::Relaxed);
    log::info!("Mock sensor simulation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_produce_samples() {
        let sensors = SensorConfig {
            random_seed: 42,
            mock_pulse_rate: 200.0,
            ..SensorConfig::default()
        };
        let attitude = AttitudeConfig {
            sample_rate_hz: 100.0,
            ..AttitudeConfig::default()
        };
        let (mut mock, streams) = MockSensors::start(&sensors, &attitude).unwrap();

        let sample = streams
            .attitude
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert!(sample.raw.accel[2] > 15000);
        assert!(streams.pulses.recv_timeout(Duration::from_secs(2)).is_ok());

        mock.stop();
        assert!(!mock.is_running());
    }

    #[test]
    fn test_stops_when_receivers_dropped() {
        let (mock, streams) =
            MockSensors::start(&SensorConfig::default(), &AttitudeConfig::default()).unwrap();
        drop(streams);
        let deadline = Instant::now() + Duration::from_secs(2);
        while mock.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!mock.is_running());
    }
}
