//! Seeded random source for the simulated sensors

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Exp, StandardNormal};

/// Noise generator with configurable seed for reproducibility
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws from OS entropy; any other seed is reproducible
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Zero-mean Gaussian sample
    #[inline]
    pub fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev <= 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Waiting time (seconds) until the next event of a Poisson process
    ///
    /// A non-positive rate never fires.
    pub fn exponential(&mut self, rate: f64) -> f64 {
        match Exp::new(rate) {
            Ok(exp) if rate > 0.0 => exp.sample(&mut self.rng),
            _ => f64::INFINITY,
        }
    }

    /// Uniform sample in [0, 1)
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }
}
