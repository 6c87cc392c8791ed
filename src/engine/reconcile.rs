//! Bringing two operands to a common level and scale.

use std::borrow::Cow;

use crate::backend::{Evaluator, HeCiphertext, Scheme};
use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Relative tolerance under which two scales count as equal.
const SCALE_EPS: f64 = 1e-9;

pub(crate) fn same_scale(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_EPS * a.abs().max(b.abs())
}

fn check_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(EngineError::DegenerateScale(scale));
    }
    Ok(())
}

impl<S: Scheme> Engine<S> {
    /// Give both operands the larger of their two scales.
    ///
    /// The lower-scale operand is multiplied by the unscaled constant
    /// `high / low` and restamped with `high`, so its message is unchanged.
    /// No-op when the scales already match.
    pub fn equalize_scale(&mut self, a: &mut S::Ciphertext, b: &mut S::Ciphertext) -> Result<()> {
        let (sa, sb) = (a.scale(), b.scale());
        check_scale(sa)?;
        check_scale(sb)?;
        if same_scale(sa, sb) {
            return Ok(());
        }
        let low = if sa < sb { a } else { b };
        self.raise_scale(low, sa.max(sb))
    }

    /// Multiply `ct` by `target / scale(ct)` and stamp it with `target`.
    pub(crate) fn raise_scale(&mut self, ct: &mut S::Ciphertext, target: f64) -> Result<()> {
        let ratio = target / ct.scale();
        tracing::trace!(from = ct.scale(), to = target, "equalizing scale");
        let mut raised = self.eval.mul_const(ct, ratio, 1.0)?;
        raised.set_scale(target);
        *ct = raised;
        Ok(())
    }

    /// Both operands at the lower of their two levels.
    ///
    /// The higher operand is copied before its excess levels are dropped;
    /// the caller's values are never touched. Equal levels borrow both.
    pub fn switch_to_same_level<'a>(
        &mut self,
        a: &'a S::Ciphertext,
        b: &'a S::Ciphertext,
    ) -> Result<(Cow<'a, S::Ciphertext>, Cow<'a, S::Ciphertext>)> {
        let (la, lb) = (a.level(), b.level());
        if la == lb {
            return Ok((Cow::Borrowed(a), Cow::Borrowed(b)));
        }
        tracing::trace!(left = la, right = lb, "dropping to common level");
        if la > lb {
            let mut a = a.clone();
            self.eval.drop_level(&mut a, la - lb)?;
            Ok((Cow::Owned(a), Cow::Borrowed(b)))
        } else {
            let mut b = b.clone();
            self.eval.drop_level(&mut b, lb - la)?;
            Ok((Cow::Borrowed(a), Cow::Owned(b)))
        }
    }

    /// Level and scale reconciliation for additive operands.
    pub(crate) fn align<'a>(
        &mut self,
        a: &'a S::Ciphertext,
        b: &'a S::Ciphertext,
    ) -> Result<(Cow<'a, S::Ciphertext>, Cow<'a, S::Ciphertext>)> {
        let (mut a, mut b) = self.switch_to_same_level(a, b)?;
        let (sa, sb) = (a.scale(), b.scale());
        check_scale(sa)?;
        check_scale(sb)?;
        if !same_scale(sa, sb) {
            if sa < sb {
                self.raise_scale(a.to_mut(), sb)?;
            } else {
                self.raise_scale(b.to_mut(), sa)?;
            }
        }
        Ok((a, b))
    }
}
