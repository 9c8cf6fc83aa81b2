//! Simulated Geiger counter: Poisson pulses via exponential inter-arrival times

use super::noise::NoiseGenerator;
use std::time::{Duration, Instant};

/// Upper bound on a single scheduled gap so a tiny rate cannot overflow `Instant`
const MAX_GAP: Duration = Duration::from_secs(3600);

pub struct MockGeiger {
    noise: NoiseGenerator,
    rate: f64,
    next_pulse: Option<Instant>,
}

impl MockGeiger {
    /// `rate` is the mean pulse rate in pulses per second
    pub fn new(noise: NoiseGenerator, rate: f64, start: Instant) -> Self {
        let mut geiger = Self {
            noise,
            rate,
            next_pulse: None,
        };
        geiger.next_pulse = geiger.schedule_after(start);
        geiger
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn schedule_after(&mut self, from: Instant) -> Option<Instant> {
        let gap = self.noise.exponential(self.rate);
        if !gap.is_finite() {
            return None;
        }
        Some(from + Duration::from_secs_f64(gap).min(MAX_GAP))
    }

    /// Emit every pulse scheduled at or before `now`, in time order
    pub fn poll(&mut self, now: Instant, mut emit: impl FnMut(Instant)) -> usize {
        let mut emitted = 0;
        while let Some(at) = self.next_pulse
            && at <= now
        {
            emit(at);
            emitted += 1;
            self.next_pulse = self.schedule_after(at);
        }
        emitted
    }
}
