//! Simulated MPU6050 on a gently swaying platform.
//!
//! The platform rocks sinusoidally about roll and pitch with different
//! periods. Outputs are raw register values (±2 g, ±1000 °/s), so the
//! readings go through the same unit conversion as real hardware.
//!
//! ```text
//! roll(t)  = S·sin(2π t / 7 s  + φ)      gyro_x = d roll / dt
//! pitch(t) = S·sin(2π t / 11 s + φ)      gyro_y = d pitch / dt
//! accel    = R(roll, pitch)ᵀ · (0, 0, 1 g)
//! ```

use super::noise::NoiseGenerator;
use crate::sensors::attitude::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS, RawAttitudeSample};
use std::f64::consts::TAU;

const ROLL_PERIOD_S: f64 = 7.0;
const PITCH_PERIOD_S: f64 = 11.0;

/// Raw temperature register for ~25 °C
const TEMP_RAW_25C: f64 = (25.0 - crate::sensors::attitude::TEMP_OFFSET_C) * 340.0;

/// IMU simulator
pub struct MockImu {
    noise: NoiseGenerator,
    sway_rad: f64,
    noise_lsb: f64,
    phase: f64,
    elapsed: f64,
}

impl MockImu {
    pub fn new(noise: NoiseGenerator, sway_deg: f64, noise_lsb: f64) -> Self {
        let mut noise = noise;
        let phase = noise.uniform() * TAU;
        Self {
            noise,
            sway_rad: sway_deg.to_radians(),
            noise_lsb,
            phase,
            elapsed: 0.0,
        }
    }

    /// True (roll, pitch) of the platform at the current time, in radians
    pub fn true_attitude(&self) -> (f64, f64) {
        let t = self.elapsed;
        (
            self.sway_rad * (TAU * t / ROLL_PERIOD_S + self.phase).sin(),
            self.sway_rad * (TAU * t / PITCH_PERIOD_S + self.phase).sin(),
        )
    }

    /// Advance the simulation by `dt` seconds and read the sensor
    pub fn generate(&mut self, dt: f64) -> RawAttitudeSample {
        self.elapsed += dt.max(0.0);
        let t = self.elapsed;
        let (roll, pitch) = self.true_attitude();

        let roll_rate =
            self.sway_rad * TAU / ROLL_PERIOD_S * (TAU * t / ROLL_PERIOD_S + self.phase).cos();
        let pitch_rate =
            self.sway_rad * TAU / PITCH_PERIOD_S * (TAU * t / PITCH_PERIOD_S + self.phase).cos();

        // Gravity in the body frame, matching atan2(ay, az) / asin(-ax)
        let ax = -pitch.sin();
        let ay = pitch.cos() * roll.sin();
        let az = pitch.cos() * roll.cos();

        let accel = [ax, ay, az].map(|g| g * ACCEL_LSB_PER_G);
        let gyro = [roll_rate, pitch_rate, 0.0].map(|r| r.to_degrees() * GYRO_LSB_PER_DPS);

        RawAttitudeSample {
            accel: [
                clamp_i16(accel[0] + self.noise.gaussian(self.noise_lsb)),
                clamp_i16(accel[1] + self.noise.gaussian(self.noise_lsb)),
                clamp_i16(accel[2] + self.noise.gaussian(self.noise_lsb)),
            ],
            gyro: [
                clamp_i16(gyro[0] + self.noise.gaussian(self.noise_lsb)),
                clamp_i16(gyro[1] + self.noise.gaussian(self.noise_lsb)),
                clamp_i16(gyro[2] + self.noise.gaussian(self.noise_lsb)),
            ],
            temperature: clamp_i16(TEMP_RAW_25C + self.noise.gaussian(self.noise_lsb)),
        }
    }
}

#[inline]
fn clamp_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
