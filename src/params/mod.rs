pub mod presets;

use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Policy parameters of an evaluation engine.
#[derive(Clone, Debug)]
pub struct EngineParams {
    /// Scale that fresh encodings use and rescaling returns to.
    pub target_scale: f64,
    /// Number of one-hot filters generated at construction.
    pub filter_count: usize,
    /// Whether multiplications may refresh their output through the
    /// bootstrapper.
    pub bootstrap: bool,
    /// A product at or below this level is bootstrapped when requested.
    pub bootstrap_threshold: usize,
    /// A rescale is only performed while `scale / target_scale` is at least
    /// this ratio.
    pub rescale_threshold: f64,
}

/// Builder for EngineParams.
pub struct EngineParamsBuilder {
    target_scale: f64,
    filter_count: usize,
    bootstrap: bool,
    bootstrap_threshold: usize,
    rescale_threshold: f64,
}

impl EngineParamsBuilder {
    pub fn new() -> Self {
        Self {
            target_scale: 2f64.powi(40),
            filter_count: 16,
            bootstrap: true,
            bootstrap_threshold: 1,
            rescale_threshold: 2.0,
        }
    }

    pub fn target_scale(mut self, scale: f64) -> Self {
        self.target_scale = scale;
        self
    }

    pub fn log_scale(mut self, log_scale: u32) -> Self {
        self.target_scale = 2f64.powi(log_scale as i32);
        self
    }

    pub fn filter_count(mut self, count: usize) -> Self {
        self.filter_count = count;
        self
    }

    pub fn bootstrap(mut self, enabled: bool) -> Self {
        self.bootstrap = enabled;
        self
    }

    pub fn bootstrap_threshold(mut self, level: usize) -> Self {
        self.bootstrap_threshold = level;
        self
    }

    pub fn rescale_threshold(mut self, ratio: f64) -> Self {
        self.rescale_threshold = ratio;
        self
    }

    pub fn build(self) -> Result<Arc<EngineParams>> {
        if !self.target_scale.is_finite() || self.target_scale <= 1.0 {
            return Err(EngineError::DegenerateScale(self.target_scale));
        }
        if !self.rescale_threshold.is_finite() || self.rescale_threshold < 1.0 {
            return Err(EngineError::InvalidParam(format!(
                "rescale_threshold must be >= 1, got {}",
                self.rescale_threshold
            )));
        }

        Ok(Arc::new(EngineParams {
            target_scale: self.target_scale,
            filter_count: self.filter_count,
            bootstrap: self.bootstrap,
            bootstrap_threshold: self.bootstrap_threshold,
            rescale_threshold: self.rescale_threshold,
        }))
    }
}

impl Default for EngineParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
