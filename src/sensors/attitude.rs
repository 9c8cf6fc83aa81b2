//! Complementary filter for roll/pitch from an MPU6050-class IMU.
//!
//! Fuses the accelerometer's gravity direction with integrated gyroscope
//! rates.
//!
//! | Source        | Strength                     | Weakness                   |
//! |---------------|------------------------------|----------------------------|
//! | Accelerometer | Absolute tilt, no drift      | Noisy, disturbed by motion |
//! | Gyroscope     | Smooth short-term rotation   | Integrates bias → drift    |
//!
//! ```text
//! acc_roll  = atan2(ay/|a|, az/|a|)        gyr_roll  = roll  + gx·dt
//! acc_pitch = asin(-ax/|a|)                gyr_pitch = pitch + gy·dt
//!
//! roll  = (1 - A)·gyr_roll  + A·acc_roll
//! pitch = (1 - A)·gyr_pitch + A·acc_pitch
//! ```
//!
//! Yaw is not estimated; the platform only cares about tipping.

use crate::config::AttitudeConfig;
use std::time::Instant;

/// LSB per g at ±2 g full scale
pub const ACCEL_LSB_PER_G: f64 = 16384.0;

/// LSB per °/s at ±1000 °/s full scale
pub const GYRO_LSB_PER_DPS: f64 = 32.8;

/// Temperature register scale (LSB per °C)
pub const TEMP_LSB_PER_C: f64 = 340.0;

/// Temperature register offset (°C)
pub const TEMP_OFFSET_C: f64 = 36.53;

/// Below this accelerometer magnitude (g) the gravity direction is meaningless
const MIN_ACCEL_MAGNITUDE: f64 = 1e-6;

/// Raw register values of one IMU sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawAttitudeSample {
    /// Accelerometer [x, y, z]
    pub accel: [i16; 3],
    /// Gyroscope [x, y, z]
    pub gyro: [i16; 3],
    /// Temperature register
    pub temperature: i16,
}

impl RawAttitudeSample {
    pub fn new(accel: [i16; 3], gyro: [i16; 3], temperature: i16) -> Self {
        Self {
            accel,
            gyro,
            temperature,
        }
    }

    /// Acceleration in g
    pub fn accel_g(&self) -> [f64; 3] {
        self.accel.map(|v| v as f64 / ACCEL_LSB_PER_G)
    }

    /// Angular rate in rad/s
    pub fn gyro_rad_s(&self) -> [f64; 3] {
        self.gyro.map(|v| (v as f64 / GYRO_LSB_PER_DPS).to_radians())
    }

    /// Die temperature in °C
    pub fn temperature_c(&self) -> f64 {
        self.temperature as f64 / TEMP_LSB_PER_C + TEMP_OFFSET_C
    }
}

/// Filter output: angles in radians, temperature in °C
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub temperature: f64,
}

impl Attitude {
    /// 32-byte wire encoding
    pub fn to_bytes(&self) -> [u8; crate::streaming::wire::ATTITUDE_LEN] {
        crate::streaming::wire::encode_attitude(self.roll, self.pitch, self.yaw, self.temperature)
    }
}

/// Stateful roll/pitch estimator, one per sensor
#[derive(Debug)]
pub struct AttitudeFilter {
    accel_weight: f64,
    roll: f64,
    pitch: f64,
    last_sample: Option<Instant>,
}

impl AttitudeFilter {
    /// Create a filter with accelerometer weight `A` (clamped to [0, 1])
    pub fn new(accel_weight: f64) -> Self {
        Self {
            accel_weight: accel_weight.clamp(0.0, 1.0),
            roll: 0.0,
            pitch: 0.0,
            last_sample: None,
        }
    }

    pub fn from_config(config: &AttitudeConfig) -> Self {
        Self::new(config.accel_weight)
    }

    pub fn accel_weight(&self) -> f64 {
        self.accel_weight
    }

    pub fn last_sample_time(&self) -> Option<Instant> {
        self.last_sample
    }

    /// Current (roll, pitch) estimate in radians
    pub fn estimate(&self) -> (f64, f64) {
        (self.roll, self.pitch)
    }

    pub fn reset(&mut self) {
        self.roll = 0.0;
        self.pitch = 0.0;
        self.last_sample = None;
    }

    /// Feed a sample taken at `now`; `dt` is the time since the previous one
    ///
    /// The first sample after creation or reset uses `dt = 0`.
    pub fn sample(&mut self, raw: &RawAttitudeSample, now: Instant) -> Attitude {
        let dt = self
            .last_sample
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        let attitude = self.update(raw, dt);
        self.last_sample = Some(now);
        attitude
    }

    /// Feed a sample with an explicit `dt` in seconds
    pub fn update(&mut self, raw: &RawAttitudeSample, dt: f64) -> Attitude {
        let [ax, ay, az] = raw.accel_g();
        let [gx, gy, _gz] = raw.gyro_rad_s();
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };

        let gyr_roll = self.roll + gx * dt;
        let gyr_pitch = self.pitch + gy * dt;

        let magnitude = (ax * ax + ay * ay + az * az).sqrt();
        let (roll, pitch) = if magnitude > MIN_ACCEL_MAGNITUDE {
            let acc_roll = (ay / magnitude).atan2(az / magnitude);
            let acc_pitch = (-ax / magnitude).clamp(-1.0, 1.0).asin();
            let a = self.accel_weight;
            (
                (1.0 - a) * gyr_roll + a * acc_roll,
                (1.0 - a) * gyr_pitch + a * acc_pitch,
            )
        } else {
            // Free fall or dead accelerometer: no gravity reference, coast on the gyro
            log::trace!("Accelerometer magnitude {:.2e} g, using gyro only", magnitude);
            (gyr_roll, gyr_pitch)
        };

        self.roll = roll;
        self.pitch = pitch;

        Attitude {
            roll,
            pitch,
            yaw: 0.0,
            temperature: raw.temperature_c(),
        }
    }
}

impl Default for AttitudeFilter {
    fn default() -> Self {
        Self::from_config(&AttitudeConfig::default())
    }
}
