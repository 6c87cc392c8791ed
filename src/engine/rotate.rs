//! Rotations over power-of-two keys and log-depth slot reductions.

use crate::backend::{Evaluator, HeCiphertext, Scheme};
use crate::engine::{Engine, MulPolicy};
use crate::error::{EngineError, Result};

/// Rotation steps `±2^i` for every `2^i < slots`, ascending by magnitude,
/// positive first.
pub fn rotation_steps(slots: usize) -> Vec<i64> {
    let mut steps = Vec::new();
    let mut k = 1usize;
    while k < slots {
        steps.push(k as i64);
        steps.push(-(k as i64));
        k <<= 1;
    }
    steps
}

/// Decompose a rotation by `k` into a sequence of available steps.
///
/// Greedy nearest-distance search: each iteration appends the step that
/// brings the running total closest to the target (first one on ties). A
/// `k` outside `[-S/2, S/2]` is first reduced modulo the slot count into
/// `(-S/2, S/2]`. Fails when no step shortens the remaining distance.
pub fn find_step(k: i64, slots: usize, steps: &[i64]) -> Result<Vec<i64>> {
    let s = slots as i64;
    let target = if k.unsigned_abs() <= (s / 2) as u64 {
        k
    } else {
        let r = k.rem_euclid(s);
        if r > s / 2 {
            r - s
        } else {
            r
        }
    };

    let mut total = 0i64;
    let mut out = Vec::new();
    while total != target {
        let remaining = (target - total).abs();
        let best = steps
            .iter()
            .copied()
            .min_by_key(|&step| (target - total - step).abs());
        match best {
            Some(step) if (target - total - step).abs() < remaining => {
                total += step;
                out.push(step);
            }
            _ => return Err(EngineError::RotationUnreachable { target: k }),
        }
    }
    Ok(out)
}

impl<S: Scheme> Engine<S> {
    /// Cyclic left rotation by `k` slots (right for negative `k`).
    pub fn rotate(&mut self, ct: &S::Ciphertext, k: i64) -> Result<S::Ciphertext> {
        let steps = find_step(k, self.slots(), self.steps())?;
        let mut out = ct.clone();
        for step in steps {
            out = self.eval.rotate(&out, step)?;
        }
        Ok(out)
    }

    pub fn rotate_assign(&mut self, ct: &mut S::Ciphertext, k: i64) -> Result<()> {
        *ct = self.rotate(ct, k)?;
        Ok(())
    }

    /// Rotate-and-add over a power-of-two `span`: afterwards slot i holds the
    /// sum of slots `i..i + span` of the input. Costs no level.
    pub fn sum_span_in_place(&mut self, ct: &mut S::Ciphertext, span: usize) -> Result<()> {
        if !span.is_power_of_two() {
            return Err(EngineError::NotPowerOfTwo(span));
        }
        if span > self.slots() {
            return Err(EngineError::DimensionMismatch {
                expected: self.slots(),
                got: span,
            });
        }
        let mut size = span;
        while size > 1 {
            size /= 2;
            let rotated = self.rotate(ct, size as i64)?;
            self.add_assign(ct, &rotated)?;
        }
        Ok(())
    }

    /// Every slot ends up holding the sum of all packed values.
    pub fn sum_elements_in_place(&mut self, ct: &mut S::Ciphertext) -> Result<()> {
        let span = ct.slots();
        self.sum_span_in_place(ct, span)
    }

    pub fn sum_elements(&mut self, ct: &S::Ciphertext) -> Result<S::Ciphertext> {
        let mut out = ct.clone();
        self.sum_elements_in_place(&mut out)?;
        Ok(out)
    }

    /// Slot-wise product reduced over all slots.
    pub fn dot_product(
        &mut self,
        a: &S::Ciphertext,
        b: &S::Ciphertext,
        policy: MulPolicy,
    ) -> Result<S::Ciphertext> {
        let mut prod = self.multiply(a, b, policy)?;
        self.sum_elements_in_place(&mut prod)?;
        Ok(prod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim;
    use crate::engine::testing::*;
    use crate::engine::Engine;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_rotation_steps() {
        assert_eq!(rotation_steps(8), vec![1, -1, 2, -2, 4, -4]);
        assert!(rotation_steps(1).is_empty());
    }

    #[test]
    fn test_find_step_examples() {
        let steps = rotation_steps(64);
        assert_eq!(find_step(0, 64, &steps).unwrap(), Vec::<i64>::new());
        assert_eq!(find_step(4, 64, &steps).unwrap(), vec![4]);
        assert_eq!(find_step(7, 64, &steps).unwrap(), vec![8, -1]);
        assert_eq!(find_step(-32, 64, &steps).unwrap(), vec![-32]);
        // 63 is -1 modulo 64.
        assert_eq!(find_step(63, 64, &steps).unwrap(), vec![-1]);
        // Extreme shifts reduce modulo the slot count.
        assert_eq!(find_step(i64::MIN, 64, &steps).unwrap(), Vec::<i64>::new());
        assert_eq!(find_step(i64::MIN + 1, 64, &steps).unwrap(), vec![1]);
        assert_eq!(find_step(i64::MAX, 64, &steps).unwrap(), vec![-1]);
    }

    #[test]
    fn test_find_step_unreachable() {
        assert!(matches!(
            find_step(-3, 64, &[1, 2]),
            Err(EngineError::RotationUnreachable { target: -3 })
        ));
        assert!(find_step(5, 64, &[]).is_err());
    }

    #[test]
    fn test_rotate_composite_shift() {
        let mut engine = compact_engine(40);
        let vals: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let ct = engine.encrypt(&vals).unwrap();
        let r = engine.rotate(&ct, 5).unwrap();
        let dec = engine.decrypt(&r).unwrap();
        for i in 0..64 {
            assert!((dec[i] - ((i + 5) % 64) as f64).abs() < 1e-3);
        }
        let l = engine.rotate(&ct, -3).unwrap();
        let dec = engine.decrypt(&l).unwrap();
        assert!((dec[3] - 0.0).abs() < 1e-3);
        assert!((dec[0] - 61.0).abs() < 1e-3);
        assert_eq!(l.level(), ct.level());
    }

    #[test]
    fn test_sum_elements() {
        let mut engine = compact_engine(41);
        let vals: Vec<f64> = (0..64).map(|i| (i as f64) * 0.1 - 2.0).collect();
        let want: f64 = vals.iter().sum();
        let mut ct = engine.encrypt(&vals).unwrap();
        let level = ct.level();
        engine.sum_elements_in_place(&mut ct).unwrap();
        assert_eq!(ct.level(), level);
        for v in engine.decrypt(&ct).unwrap() {
            assert!((v - want).abs() < 1e-1);
        }
    }

    #[test]
    fn test_sum_span() {
        let mut engine = compact_engine(42);
        let ct = engine.encrypt(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        let mut s = ct.clone();
        engine.sum_span_in_place(&mut s, 4).unwrap();
        assert!((engine.decrypt(&s).unwrap()[0] - 10.0).abs() < 1e-3);
        assert!(matches!(
            engine.sum_span_in_place(&mut s, 6),
            Err(EngineError::NotPowerOfTwo(6))
        ));
        assert!(matches!(
            engine.sum_span_in_place(&mut s, 128),
            Err(EngineError::DimensionMismatch { expected: 64, got: 128 })
        ));
    }

    #[test]
    fn test_dot_product() {
        let mut engine = compact_engine(43);
        let a = engine.encrypt(&[1.0, 2.0, 3.0]).unwrap();
        let b = engine.encrypt(&[4.0, 5.0, 6.0]).unwrap();
        let d = engine.dot_product(&a, &b, MulPolicy::AUTO).unwrap();
        assert!((engine.decrypt(&d).unwrap()[17] - 32.0).abs() < 1e-2);
    }

    #[test]
    fn test_rotate_without_keys() {
        let params = sim::params::compact().unwrap();
        let keys = sim::keygen_with_steps(&params, &[1, 2], &mut ChaCha20Rng::seed_from_u64(44))
            .unwrap();
        let mut engine = Engine::new(keys, crate::params::presets::compact().unwrap()).unwrap();
        assert_eq!(engine.steps(), &[1, 2]);
        let ct = engine.encrypt(&[1.0]).unwrap();
        assert!(engine.rotate(&ct, 3).is_ok());
        assert!(matches!(
            engine.rotate(&ct, -1),
            Err(EngineError::RotationUnreachable { target: -1 })
        ));
    }
}
