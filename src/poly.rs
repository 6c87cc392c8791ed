//! Polynomial evaluation over a power tree.
//!
//! A [`Polynomial`] holds `(degree, coefficient)` terms. Coefficients are
//! encoded lazily, once per slot count, and kept in a read-mostly cache so
//! repeated evaluations (one per activation layer per iteration) do not
//! re-encode.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::backend::Scheme;
use crate::engine::{Engine, MulPolicy};
use crate::error::{EngineError, Result};

/// Non-constant coefficients encoded for one slot count, NTT-ready.
struct EncodedTerms<S: Scheme> {
    terms: Vec<(usize, S::Plaintext)>,
}

pub struct Polynomial<S: Scheme> {
    terms: Vec<(usize, f64)>,
    cache: RwLock<HashMap<usize, Arc<EncodedTerms<S>>>>,
}

impl<S: Scheme> fmt::Debug for Polynomial<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polynomial").field("terms", &self.terms).finish()
    }
}

impl<S: Scheme> Polynomial<S> {
    /// Build from `(degree, coefficient)` pairs. Zero coefficients are
    /// dropped; repeated degrees are summed.
    pub fn new(terms: impl IntoIterator<Item = (usize, f64)>) -> Result<Self> {
        let mut merged: Vec<(usize, f64)> = Vec::new();
        for (d, c) in terms {
            if !c.is_finite() {
                return Err(EngineError::InvalidParam(format!(
                    "coefficient of x^{d} is not finite"
                )));
            }
            match merged.iter_mut().find(|(md, _)| *md == d) {
                Some((_, mc)) => *mc += c,
                None => merged.push((d, c)),
            }
        }
        merged.retain(|&(_, c)| c != 0.0);
        merged.sort_by_key(|&(d, _)| d);
        Ok(Self {
            terms: merged,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// `coeffs[d]` is the coefficient of `x^d`.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self> {
        Self::new(coeffs.iter().copied().enumerate())
    }

    pub fn degree(&self) -> usize {
        self.terms.last().map_or(0, |&(d, _)| d)
    }

    pub fn terms(&self) -> &[(usize, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.terms
            .iter()
            .find(|&&(d, _)| d == 0)
            .map_or(0.0, |&(_, c)| c)
    }

    /// Plaintext evaluation, used as the reference for encrypted results.
    pub fn eval_plain(&self, x: f64) -> f64 {
        self.terms
            .iter()
            .map(|&(d, c)| c * x.powi(d as i32))
            .sum()
    }

    /// Cached encodings covering the first `size` slots, filled on first
    /// use. Sizes sharing a power-of-two packing share one entry.
    fn encoded(&self, engine: &mut Engine<S>, size: usize) -> Result<Arc<EncodedTerms<S>>> {
        if size == 0 || size > engine.slots() {
            return Err(EngineError::DimensionMismatch {
                expected: engine.slots(),
                got: size,
            });
        }
        let slots = size.next_power_of_two();
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EngineError::Backend("polynomial cache poisoned".into()))?;
            if let Some(hit) = cache.get(&slots) {
                return Ok(hit.clone());
            }
        }

        let level = engine.max_level();
        let scale = engine.target_scale();
        let mut terms = Vec::new();
        for &(d, c) in self.terms.iter().filter(|&&(d, _)| d > 0) {
            let pt = engine.encode_at(&vec![c; slots], level, scale, slots)?;
            terms.push((d, engine.ntt_ready(&pt)?.into_owned()));
        }
        tracing::debug!(slots, terms = terms.len(), "encoded polynomial coefficients");

        let mut cache = self
            .cache
            .write()
            .map_err(|_| EngineError::Backend("polynomial cache poisoned".into()))?;
        Ok(cache
            .entry(slots)
            .or_insert_with(|| Arc::new(EncodedTerms { terms }))
            .clone())
    }

    #[cfg(test)]
    pub(crate) fn cached_sizes(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl<S: Scheme> Engine<S> {
    /// Evaluate `poly` on the first `size` slots of `x`. Any `size` up to
    /// the slot count is accepted.
    ///
    /// Squares `x` into `x^(2^j)` once, then builds each monomial
    /// `c_d · x^d` independently: the coefficient goes onto the lowest
    /// power in the binary expansion of `d` and the remaining powers are
    /// multiplied in ascending order. Monomials are summed through a
    /// [`crate::engine::SafeSum`] and the constant is added last, at no
    /// depth cost.
    #[tracing::instrument(skip_all, fields(degree = poly.degree(), size = size, concurrent = concurrent))]
    pub fn evaluate_degree_n(
        &mut self,
        x: &S::Ciphertext,
        poly: &Polynomial<S>,
        size: usize,
        concurrent: bool,
    ) -> Result<S::Ciphertext> {
        let degree = poly.degree();
        if degree == 0 {
            return Err(EngineError::InvalidParam(
                "polynomial has no non-constant term".into(),
            ));
        }
        let encoded = poly.encoded(self, size)?;

        let mut powers = vec![x.clone()];
        while 1usize << powers.len() <= degree {
            let last = &powers[powers.len() - 1];
            let sq = self.multiply(last, last, MulPolicy::AUTO)?;
            powers.push(sq);
        }

        let monomials = &encoded.terms;
        let sum = self.fan_in(monomials.len(), concurrent, |engine, t| {
            let (d, coeff) = &monomials[t];
            let mut bits = (0..powers.len()).filter(|&j| *d & (1usize << j) != 0);
            let lowest = bits.next().ok_or_else(|| {
                EngineError::InvalidParam(format!("degree {d} has no power"))
            })?;
            let mut acc = engine.multiply_plain(&powers[lowest], coeff, MulPolicy::AUTO)?;
            for j in bits {
                acc = engine.multiply(&acc, &powers[j], MulPolicy::AUTO)?;
            }
            Ok(acc)
        })?;

        let c0 = poly.constant();
        if c0 == 0.0 {
            Ok(sum)
        } else {
            self.add_const(&sum, c0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::Sim;
    use crate::backend::HeCiphertext;
    use crate::engine::testing::*;

    #[test]
    fn test_polynomial_terms() {
        let p = Polynomial::<Sim>::new([(3, 1.0), (0, 2.0), (3, 0.5), (1, 0.0)]).unwrap();
        assert_eq!(p.terms(), &[(0, 2.0), (3, 1.5)]);
        assert_eq!(p.degree(), 3);
        assert_eq!(p.constant(), 2.0);
        assert_eq!(p.eval_plain(2.0), 14.0);
        assert!(Polynomial::<Sim>::new([(1, f64::NAN)]).is_err());
    }

    #[test]
    fn test_evaluate_cubic() {
        let mut engine = compact_engine(80);
        let p = Polynomial::from_coefficients(&[0.5, -1.0, 0.0, 0.25]).unwrap();
        let xs = [0.3, -1.2, 1.5, 0.0];
        let x = engine.encrypt(&xs).unwrap();
        let out = engine.evaluate_degree_n(&x, &p, 64, false).unwrap();
        let want: Vec<f64> = xs.iter().map(|&v| p.eval_plain(v)).collect();
        assert_close(&engine.decrypt(&out).unwrap()[..4], &want, 1e-2);
        // x^3 = x * x^2: power tree plus one combination step.
        assert_eq!(out.level(), x.level() - 2);
    }

    #[test]
    fn test_evaluate_concurrent_matches_sequential() {
        let mut engine = compact_engine(81);
        let p = Polynomial::from_coefficients(&[1.0, 0.5, 0.25, 0.125, 0.0625]).unwrap();
        let x = engine.encrypt(&[0.8, -0.4]).unwrap();
        let seq = engine.evaluate_degree_n(&x, &p, 64, false).unwrap();
        let par = engine.evaluate_degree_n(&x, &p, 64, true).unwrap();
        let s = engine.decrypt(&seq).unwrap();
        let q = engine.decrypt(&par).unwrap();
        assert_close(&s[..2], &q[..2], 1e-3);
        assert_close(&s[..2], &[p.eval_plain(0.8), p.eval_plain(-0.4)], 1e-2);
    }

    #[test]
    fn test_encodings_cached_per_slot_count() {
        let mut engine = compact_engine(82);
        let p = Polynomial::from_coefficients(&[0.0, 2.0]).unwrap();
        let x = engine.encrypt(&[1.0]).unwrap();
        engine.evaluate_degree_n(&x, &p, 64, false).unwrap();
        engine.evaluate_degree_n(&x, &p, 64, false).unwrap();
        assert_eq!(p.cached_sizes(), 1);
        engine.evaluate_degree_n(&x, &p, 16, false).unwrap();
        assert_eq!(p.cached_sizes(), 2);
    }

    #[test]
    fn test_evaluate_unpadded_size() {
        let mut engine = compact_engine(84);
        let p = Polynomial::from_coefficients(&[1.0, 0.5, 0.25]).unwrap();
        let xs = [0.4, -0.6, 1.1, 0.0, 2.0, -1.5, 0.7, 0.2, -0.3, 1.0];
        let x = engine.encrypt(&xs).unwrap();
        let out = engine.evaluate_degree_n(&x, &p, xs.len(), false).unwrap();
        let want: Vec<f64> = xs.iter().map(|&v| p.eval_plain(v)).collect();
        assert_close(&engine.decrypt(&out).unwrap()[..10], &want, 1e-2);
        // 10 and 16 share the 16-slot packing.
        engine.evaluate_degree_n(&x, &p, 16, false).unwrap();
        assert_eq!(p.cached_sizes(), 1);
        assert!(matches!(
            engine.evaluate_degree_n(&x, &p, 65, false),
            Err(EngineError::DimensionMismatch { expected: 64, got: 65 })
        ));
    }

    #[test]
    fn test_constant_polynomial_rejected() {
        let mut engine = compact_engine(83);
        let p = Polynomial::from_coefficients(&[3.0]).unwrap();
        let x = engine.encrypt(&[1.0]).unwrap();
        assert!(matches!(
            engine.evaluate_degree_n(&x, &p, 64, false),
            Err(EngineError::InvalidParam(_))
        ));
    }
}
