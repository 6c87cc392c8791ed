//! The evaluation engine.
//!
//! An [`Engine`] is a cheap handle made of two halves:
//! - an immutable [`EngineContext`] (policy parameters, slot count, the
//!   rotation steps that have keys, the one-hot filter set), shared through
//!   an `Arc` by every copy of the engine;
//! - task-local scratch: the primitive's evaluator, encoder, encryptor and
//!   optional decryptor/bootstrapper.
//!
//! [`Engine::shallow_copy`] clones the `Arc` and shallow-copies the scratch,
//! which is how the fan-out layer in [`parallel`] hands every parallel unit
//! of work its own evaluator.

pub mod arith;
pub mod parallel;
pub mod reconcile;
pub mod rotate;
pub mod structure;

pub use arith::MulPolicy;
pub use parallel::SafeSum;

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::activation::Activation;
use crate::backend::{
    Decryptor, Encoder, Encryptor, Evaluator, HePlaintext, KeySet, Scheme, ShallowCopy,
};
use crate::engine::rotate::rotation_steps;
use crate::error::{EngineError, Result};
use crate::params::EngineParams;
use crate::poly::Polynomial;

/// Immutable state shared by every copy of an engine.
pub struct EngineContext<S: Scheme> {
    params: Arc<EngineParams>,
    slots: usize,
    max_level: usize,
    /// Rotation steps with keys, ascending by magnitude, positive first.
    steps: Vec<i64>,
    /// `filters[i]` is one at slot i, zero elsewhere. NTT-ready.
    filters: Vec<S::Plaintext>,
    /// Fitted activation polynomials, built on first use.
    activations: RwLock<HashMap<Activation, Arc<Polynomial<S>>>>,
}

pub struct Engine<S: Scheme> {
    ctx: Arc<EngineContext<S>>,
    eval: S::Evaluator,
    encoder: S::Encoder,
    encryptor: S::Encryptor,
    decryptor: Option<S::Decryptor>,
    bootstrapper: Option<S::Bootstrapper>,
}

impl<S: Scheme> Engine<S> {
    /// Bind an engine to a key set.
    ///
    /// Generates the filter set once; it is never mutated afterwards.
    pub fn new(keys: KeySet<S>, params: Arc<EngineParams>) -> Result<Self> {
        let KeySet {
            evaluator,
            mut encoder,
            encryptor,
            decryptor,
            bootstrapper,
            slots,
            max_level,
        } = keys;

        if !slots.is_power_of_two() {
            return Err(EngineError::NotPowerOfTwo(slots));
        }
        if params.filter_count > slots {
            return Err(EngineError::InvalidParam(format!(
                "filter_count {} exceeds slot count {}",
                params.filter_count, slots
            )));
        }
        let bootstrapper = if params.bootstrap {
            if bootstrapper.is_none() {
                return Err(EngineError::MissingBootstrapper);
            }
            if params.bootstrap_threshold >= max_level {
                return Err(EngineError::InvalidParam(format!(
                    "bootstrap_threshold {} must be below max level {}",
                    params.bootstrap_threshold, max_level
                )));
            }
            bootstrapper
        } else {
            None
        };

        let mut filters = Vec::with_capacity(params.filter_count);
        for i in 0..params.filter_count {
            let mut one_hot = vec![0.0; i + 1];
            one_hot[i] = 1.0;
            let mut pt = encoder.encode(&one_hot, max_level, params.target_scale, slots)?;
            encoder.to_ntt(&mut pt)?;
            filters.push(pt);
        }

        let steps = rotation_steps(slots)
            .into_iter()
            .filter(|&k| evaluator.has_rotation_key(k))
            .collect();

        tracing::debug!(
            slots,
            max_level,
            filters = params.filter_count,
            bootstrap = params.bootstrap,
            "engine constructed"
        );

        Ok(Self {
            ctx: Arc::new(EngineContext {
                params,
                slots,
                max_level,
                steps,
                filters,
                activations: RwLock::new(HashMap::new()),
            }),
            eval: evaluator,
            encoder,
            encryptor,
            decryptor,
            bootstrapper,
        })
    }

    /// Task-local copy sharing the context and key material.
    pub fn shallow_copy(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            eval: self.eval.shallow_copy(),
            encoder: self.encoder.shallow_copy(),
            encryptor: self.encryptor.shallow_copy(),
            decryptor: self.decryptor.as_ref().map(ShallowCopy::shallow_copy),
            bootstrapper: self.bootstrapper.as_ref().map(ShallowCopy::shallow_copy),
        }
    }

    pub fn params(&self) -> &EngineParams {
        &self.ctx.params
    }

    pub fn slots(&self) -> usize {
        self.ctx.slots
    }

    pub fn max_level(&self) -> usize {
        self.ctx.max_level
    }

    pub fn target_scale(&self) -> f64 {
        self.ctx.params.target_scale
    }

    /// Rotation steps with keys.
    pub fn steps(&self) -> &[i64] {
        &self.ctx.steps
    }

    pub fn bootstrapper(&self) -> Option<&S::Bootstrapper> {
        self.bootstrapper.as_ref()
    }

    pub fn filter_count(&self) -> usize {
        self.ctx.filters.len()
    }

    pub fn filter(&self, index: usize) -> Result<&S::Plaintext> {
        self.ctx
            .filters
            .get(index)
            .ok_or(EngineError::FilterOutOfRange {
                index,
                count: self.ctx.filters.len(),
            })
    }

    /// Filter with `value` at slot `index` instead of one. Not cached.
    pub fn filter_with_value(&mut self, index: usize, value: f64) -> Result<S::Plaintext> {
        if index >= self.ctx.slots {
            return Err(EngineError::FilterOutOfRange {
                index,
                count: self.ctx.slots,
            });
        }
        let mut v = vec![0.0; index + 1];
        v[index] = value;
        let mut pt = self.encode_at(&v, self.ctx.max_level, self.target_scale(), self.ctx.slots)?;
        self.encoder.to_ntt(&mut pt)?;
        Ok(pt)
    }

    /// Encode at max level and target scale over all slots.
    pub fn encode(&mut self, values: &[f64]) -> Result<S::Plaintext> {
        self.encode_at(values, self.ctx.max_level, self.target_scale(), self.ctx.slots)
    }

    pub fn encode_at(
        &mut self,
        values: &[f64],
        level: usize,
        scale: f64,
        slots: usize,
    ) -> Result<S::Plaintext> {
        self.encoder.encode(values, level, scale, slots)
    }

    pub fn decode(&mut self, p: &S::Plaintext) -> Result<Vec<f64>> {
        self.encoder.decode(p)
    }

    /// Encode and encrypt at max level.
    pub fn encrypt(&mut self, values: &[f64]) -> Result<S::Ciphertext> {
        let pt = self.encode(values)?;
        self.encryptor.encrypt(&pt)
    }

    pub fn encrypt_at_level(&mut self, values: &[f64], level: usize) -> Result<S::Ciphertext> {
        let pt = self.encode_at(values, level, self.target_scale(), self.ctx.slots)?;
        self.encryptor.encrypt(&pt)
    }

    pub fn encrypt_plain(&mut self, p: &S::Plaintext) -> Result<S::Ciphertext> {
        self.encryptor.encrypt(p)
    }

    /// Decrypt and decode all slots of `ct`.
    pub fn decrypt(&mut self, ct: &S::Ciphertext) -> Result<Vec<f64>> {
        let dec = self
            .decryptor
            .as_mut()
            .ok_or(EngineError::MissingDecryptor)?;
        let pt = dec.decrypt(ct)?;
        self.encoder.decode(&pt)
    }

    pub(crate) fn activation_cache(&self) -> &RwLock<HashMap<Activation, Arc<Polynomial<S>>>> {
        &self.ctx.activations
    }

    /// `p` itself when already NTT-ready, else an NTT-ready copy.
    pub(crate) fn ntt_ready<'a>(&mut self, p: &'a S::Plaintext) -> Result<Cow<'a, S::Plaintext>> {
        if p.is_ntt() {
            return Ok(Cow::Borrowed(p));
        }
        let mut owned = p.clone();
        self.encoder.to_ntt(&mut owned)?;
        Ok(Cow::Owned(owned))
    }
}
