use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Parameters of the reference backend.
#[derive(Clone, Debug)]
pub struct SimParams {
    /// Slot count S (power of 2).
    pub slots: usize,
    /// Level of a fresh ciphertext; also the bootstrap target.
    pub max_level: usize,
    /// log2 of the default encoding scale.
    pub log_scale: u32,
    /// Modulus chain: `moduli[l]` is divided out when rescaling from level l.
    ///
    /// Each prime sits close to, but not exactly at, `2^log_scale`, so scales
    /// drift apart along different op sequences as they would on a real
    /// chain of NTT-friendly primes.
    pub moduli: Vec<f64>,
    /// Standard deviation of fresh-encryption noise, in message units.
    pub fresh_noise: f64,
    /// Standard deviation of rescale rounding noise, in message units.
    pub rescale_noise: f64,
    /// Standard deviation of bootstrapping noise, in message units.
    pub bootstrap_noise: f64,
}

impl SimParams {
    pub fn default_scale(&self) -> f64 {
        2f64.powi(self.log_scale as i32)
    }
}

/// Builder for SimParams.
pub struct SimParamsBuilder {
    slots: usize,
    max_level: usize,
    log_scale: u32,
    fresh_noise: f64,
    rescale_noise: f64,
    bootstrap_noise: f64,
}

impl SimParamsBuilder {
    pub fn new() -> Self {
        Self {
            slots: 64,
            max_level: 12,
            log_scale: 40,
            fresh_noise: 1e-7,
            rescale_noise: 1e-8,
            bootstrap_noise: 1e-5,
        }
    }

    pub fn slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    pub fn max_level(mut self, level: usize) -> Self {
        self.max_level = level;
        self
    }

    pub fn log_scale(mut self, log_scale: u32) -> Self {
        self.log_scale = log_scale;
        self
    }

    pub fn fresh_noise(mut self, sigma: f64) -> Self {
        self.fresh_noise = sigma;
        self
    }

    pub fn rescale_noise(mut self, sigma: f64) -> Self {
        self.rescale_noise = sigma;
        self
    }

    pub fn bootstrap_noise(mut self, sigma: f64) -> Self {
        self.bootstrap_noise = sigma;
        self
    }

    pub fn build(self) -> Result<Arc<SimParams>> {
        if !self.slots.is_power_of_two() || self.slots < 2 {
            return Err(EngineError::NotPowerOfTwo(self.slots));
        }
        if self.max_level < 1 {
            return Err(EngineError::InvalidParam("max_level must be >= 1".into()));
        }
        if !(20..=60).contains(&self.log_scale) {
            return Err(EngineError::InvalidParam(format!(
                "log_scale must be in [20, 60], got {}",
                self.log_scale
            )));
        }
        for (name, sigma) in [
            ("fresh_noise", self.fresh_noise),
            ("rescale_noise", self.rescale_noise),
            ("bootstrap_noise", self.bootstrap_noise),
        ] {
            if !sigma.is_finite() || sigma < 0.0 {
                return Err(EngineError::InvalidParam(format!("{name} must be >= 0")));
            }
        }

        let base = 2f64.powi(self.log_scale as i32);
        let moduli = (0..=self.max_level)
            .map(|l| base * (1.0 + prime_drift(l)))
            .collect();

        Ok(Arc::new(SimParams {
            slots: self.slots,
            max_level: self.max_level,
            log_scale: self.log_scale,
            moduli,
            fresh_noise: self.fresh_noise,
            rescale_noise: self.rescale_noise,
            bootstrap_noise: self.bootstrap_noise,
        }))
    }
}

impl Default for SimParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Relative distance of the level-l prime from 2^log_scale, within ±5e-6.
fn prime_drift(level: usize) -> f64 {
    (((level * 37) % 9) as f64 - 4.0) * 1e-6
}

/// 64 slots, 12 levels, 2^40 scale. Fast enough for unit tests.
pub fn compact() -> Result<Arc<SimParams>> {
    SimParamsBuilder::new().build()
}

/// 16 slots, 6 levels. Forces frequent bootstrapping.
pub fn shallow() -> Result<Arc<SimParams>> {
    SimParamsBuilder::new().slots(16).max_level(6).build()
}

/// 1024 slots, 20 levels, for benches.
pub fn wide() -> Result<Arc<SimParams>> {
    SimParamsBuilder::new()
        .slots(1024)
        .max_level(20)
        .log_scale(45)
        .build()
}
