//! Add/sub/multiply with rescale and auto-bootstrap policy.

use crate::backend::{Bootstrapper, Evaluator, HeCiphertext, HePlaintext, Scheme};
use crate::engine::reconcile::same_scale;
use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// What happens to a product after the relinearizing multiply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MulPolicy {
    /// Divide back towards the target scale, consuming one level.
    pub rescale: bool,
    /// Refresh the product once its level reaches the bootstrap threshold.
    pub bootstrap: bool,
}

impl MulPolicy {
    /// Leave the product at the product scale.
    pub const RAW: Self = Self {
        rescale: false,
        bootstrap: false,
    };
    /// Rescale only.
    pub const RESCALE: Self = Self {
        rescale: true,
        bootstrap: false,
    };
    /// Rescale, then bootstrap when the depth budget runs out.
    pub const AUTO: Self = Self {
        rescale: true,
        bootstrap: true,
    };
}

impl<S: Scheme> Engine<S> {
    pub fn add(&mut self, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext> {
        let (a, b) = self.align(a, b)?;
        self.eval.add(&a, &b)
    }

    pub fn add_assign(&mut self, a: &mut S::Ciphertext, b: &S::Ciphertext) -> Result<()> {
        *a = self.add(a, b)?;
        Ok(())
    }

    pub fn sub(&mut self, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext> {
        let (a, b) = self.align(a, b)?;
        self.eval.sub(&a, &b)
    }

    pub fn sub_assign(&mut self, a: &mut S::Ciphertext, b: &S::Ciphertext) -> Result<()> {
        *a = self.sub(a, b)?;
        Ok(())
    }

    pub fn neg(&mut self, a: &S::Ciphertext) -> Result<S::Ciphertext> {
        self.eval.neg(a)
    }

    /// Add a plaintext encoded at the ciphertext's scale.
    pub fn add_plain(&mut self, a: &S::Ciphertext, p: &S::Plaintext) -> Result<S::Ciphertext> {
        if !same_scale(a.scale(), p.scale()) {
            return Err(EngineError::ScaleMismatch {
                left: a.scale(),
                right: p.scale(),
            });
        }
        if p.level() < a.level() {
            let excess = a.level() - p.level();
            let mut a = a.clone();
            self.eval.drop_level(&mut a, excess)?;
            return self.eval.add_plain(&a, p);
        }
        self.eval.add_plain(a, p)
    }

    /// Add `c` to every slot. Costs no depth.
    pub fn add_const(&mut self, a: &S::Ciphertext, c: f64) -> Result<S::Ciphertext> {
        let p = self.encode_at(&[c], a.level(), a.scale(), 1)?;
        self.add_plain(a, &p)
    }

    /// Relinearizing ciphertext × ciphertext product.
    pub fn multiply(
        &mut self,
        a: &S::Ciphertext,
        b: &S::Ciphertext,
        policy: MulPolicy,
    ) -> Result<S::Ciphertext> {
        let (a, b) = self.switch_to_same_level(a, b)?;
        let out = self.eval.mul_relin(&a, &b)?;
        self.finish(out, policy)
    }

    pub fn multiply_assign(
        &mut self,
        a: &mut S::Ciphertext,
        b: &S::Ciphertext,
        policy: MulPolicy,
    ) -> Result<()> {
        *a = self.multiply(a, b, policy)?;
        Ok(())
    }

    /// Ciphertext × plaintext. The plaintext is moved to NTT form first if
    /// it is not already there.
    pub fn multiply_plain(
        &mut self,
        a: &S::Ciphertext,
        p: &S::Plaintext,
        policy: MulPolicy,
    ) -> Result<S::Ciphertext> {
        let p = self.ntt_ready(p)?;
        let out = if p.level() < a.level() {
            let excess = a.level() - p.level();
            let mut a = a.clone();
            self.eval.drop_level(&mut a, excess)?;
            self.eval.mul_plain(&a, &p)?
        } else {
            self.eval.mul_plain(a, &p)?
        };
        self.finish(out, policy)
    }

    pub fn multiply_plain_assign(
        &mut self,
        a: &mut S::Ciphertext,
        p: &S::Plaintext,
        policy: MulPolicy,
    ) -> Result<()> {
        *a = self.multiply_plain(a, p, policy)?;
        Ok(())
    }

    /// Multiply every slot by `c`.
    ///
    /// When rescaling, `c` is encoded at the target scale so the rescale
    /// brings the product back; otherwise it is applied unscaled.
    pub fn multiply_const(
        &mut self,
        a: &S::Ciphertext,
        c: f64,
        policy: MulPolicy,
    ) -> Result<S::Ciphertext> {
        let const_scale = if policy.rescale {
            self.target_scale()
        } else {
            1.0
        };
        let out = self.eval.mul_const(a, c, const_scale)?;
        self.finish(out, policy)
    }

    pub fn multiply_const_assign(
        &mut self,
        a: &mut S::Ciphertext,
        c: f64,
        policy: MulPolicy,
    ) -> Result<()> {
        *a = self.multiply_const(a, c, policy)?;
        Ok(())
    }

    /// Slot-wise product with a vector of constants; missing slots are zero.
    pub fn multiply_const_array(
        &mut self,
        a: &S::Ciphertext,
        values: &[f64],
        policy: MulPolicy,
    ) -> Result<S::Ciphertext> {
        let slots = self.slots();
        if values.len() > slots {
            return Err(EngineError::DimensionMismatch {
                expected: slots,
                got: values.len(),
            });
        }
        let p = self.encode_at(values, a.level(), self.target_scale(), slots)?;
        self.multiply_plain(a, &p, policy)
    }

    pub fn multiply_const_array_assign(
        &mut self,
        a: &mut S::Ciphertext,
        values: &[f64],
        policy: MulPolicy,
    ) -> Result<()> {
        *a = self.multiply_const_array(a, values, policy)?;
        Ok(())
    }

    /// Divide out one modulus, unless the ciphertext is already within
    /// `rescale_threshold` of the target scale.
    pub fn rescale(&mut self, a: &mut S::Ciphertext) -> Result<()> {
        let ratio = a.scale() / self.target_scale();
        if ratio < self.params().rescale_threshold {
            tracing::trace!(scale = a.scale(), "rescale skipped, already near target scale");
            return Ok(());
        }
        if a.level() == 0 {
            return Err(EngineError::DepthExhausted { level: 0 });
        }
        self.eval.rescale(a)?;
        tracing::trace!(level = a.level(), scale = a.scale(), "rescaled");
        Ok(())
    }

    pub fn drop_level(&mut self, a: &mut S::Ciphertext, levels: usize) -> Result<()> {
        self.eval.drop_level(a, levels)
    }

    /// Refresh `a` to the maximum level unconditionally.
    pub fn bootstrap(&mut self, a: &mut S::Ciphertext) -> Result<()> {
        let boot = self
            .bootstrapper
            .as_mut()
            .ok_or(EngineError::MissingBootstrapper)?;
        let before = a.level();
        *a = boot.bootstrap(a)?;
        tracing::debug!(before, after = a.level(), "bootstrapped");
        Ok(())
    }

    /// Bootstrap `a` if its level is at or below the threshold and the
    /// engine has bootstrapping enabled. Returns whether it bootstrapped.
    pub fn bootstrap_if_needed(&mut self, a: &mut S::Ciphertext) -> Result<bool> {
        if a.level() > self.params().bootstrap_threshold || self.bootstrapper.is_none() {
            return Ok(false);
        }
        self.bootstrap(a)?;
        Ok(true)
    }

    fn finish(&mut self, mut out: S::Ciphertext, policy: MulPolicy) -> Result<S::Ciphertext> {
        if policy.rescale {
            self.rescale(&mut out)?;
        }
        let refreshed = policy.bootstrap && self.bootstrap_if_needed(&mut out)?;
        if !refreshed && out.level() <= self.params().bootstrap_threshold {
            tracing::warn!(
                level = out.level(),
                "product at bootstrap threshold without refresh; further products lose precision"
            );
        }
        Ok(out)
    }
}
