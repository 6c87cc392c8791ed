//! Reference backend: an insecure stand-in for a CKKS library.
//!
//! Ciphertexts carry their encoded slot vector (message × scale) in the
//! clear, together with the level/scale metadata a real ciphertext has.
//! Every operation acts on the encoded vector the way CKKS decoding would
//! observe it: adding operands of different scale gives the same wrong
//! answer a real scheme gives, rescaling divides by a per-level prime that
//! is close to but not equal to the default scale, and fresh encryption,
//! rescaling and bootstrapping inject Gaussian noise.
//!
//! Nothing here is encryption. It exists to exercise the engine's level,
//! scale, rotation-key and bootstrap policies without a lattice library.

pub mod keygen;
pub mod params;

pub use keygen::{keygen, keygen_with_steps};
pub use params::{SimParams, SimParamsBuilder};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use zeroize::Zeroize;

use crate::backend::{
    Bootstrapper, Decryptor, Encoder, Encryptor, Evaluator, HeCiphertext, HePlaintext, Scheme,
    ShallowCopy,
};
use crate::error::{EngineError, Result};

/// Marker type selecting the reference backend.
#[derive(Clone, Copy, Debug)]
pub struct Sim;

impl Scheme for Sim {
    type Ciphertext = SimCiphertext;
    type Plaintext = SimPlaintext;
    type Evaluator = SimEvaluator;
    type Encoder = SimEncoder;
    type Encryptor = SimEncryptor;
    type Decryptor = SimDecryptor;
    type Bootstrapper = SimBootstrapper;
}

#[derive(Clone, Debug)]
pub struct SimCiphertext {
    /// Encoded slots: message × scale, length S.
    values: Vec<f64>,
    level: usize,
    scale: f64,
    slots: usize,
    key_id: u64,
}

impl HeCiphertext for SimCiphertext {
    fn level(&self) -> usize {
        self.level
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    fn slots(&self) -> usize {
        self.slots
    }
}

#[derive(Clone, Debug)]
pub struct SimPlaintext {
    values: Vec<f64>,
    level: usize,
    scale: f64,
    slots: usize,
    ntt: bool,
}

impl HePlaintext for SimPlaintext {
    fn level(&self) -> usize {
        self.level
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn slots(&self) -> usize {
        self.slots
    }

    fn is_ntt(&self) -> bool {
        self.ntt
    }
}

/// Key material shared read-only by every capability and all their copies.
pub(crate) struct SimKeys {
    pub(crate) params: Arc<SimParams>,
    pub(crate) key_id: u64,
    pub(crate) rotations: BTreeSet<i64>,
    noise_seed: [u8; 32],
    streams: AtomicU64,
}

impl SimKeys {
    pub(crate) fn new(
        params: Arc<SimParams>,
        secret: &[u8; 32],
        rotations: BTreeSet<i64>,
    ) -> Self {
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&secret[..8]);
        let mut noise_seed = *secret;
        // The noise seed must differ from the identifying bytes.
        noise_seed.reverse();
        Self {
            params,
            key_id: u64::from_le_bytes(id_bytes),
            rotations,
            noise_seed,
            streams: AtomicU64::new(0),
        }
    }

    /// A noise generator on a stream no other copy uses.
    fn fresh_rng(&self) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::from_seed(self.noise_seed);
        rng.set_stream(self.streams.fetch_add(1, Ordering::Relaxed));
        rng
    }

    fn check_key(&self, key_id: u64) -> Result<()> {
        if key_id != self.key_id {
            return Err(EngineError::InvalidParam(
                "ciphertext belongs to a different key set".into(),
            ));
        }
        Ok(())
    }

    fn has_rotation(&self, step: i64) -> bool {
        let s = self.params.slots as i64;
        let r = step.rem_euclid(s);
        r == 0 || self.rotations.contains(&r) || self.rotations.contains(&(r - s))
    }
}

impl Drop for SimKeys {
    fn drop(&mut self) {
        self.noise_seed.zeroize();
    }
}

fn add_noise(values: &mut [f64], sigma: f64, rng: &mut ChaCha20Rng) -> Result<()> {
    if sigma == 0.0 {
        return Ok(());
    }
    let dist = Normal::new(0.0, sigma).map_err(|e| EngineError::Backend(e.to_string()))?;
    for v in values.iter_mut() {
        *v += dist.sample(rng);
    }
    Ok(())
}

pub struct SimEvaluator {
    keys: Arc<SimKeys>,
    rng: ChaCha20Rng,
}

impl SimEvaluator {
    pub(crate) fn new(keys: Arc<SimKeys>) -> Self {
        let rng = keys.fresh_rng();
        Self { keys, rng }
    }

    fn check_pair(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<()> {
        self.keys.check_key(a.key_id)?;
        self.keys.check_key(b.key_id)?;
        if a.level != b.level {
            return Err(EngineError::LevelMismatch {
                left: a.level,
                right: b.level,
            });
        }
        Ok(())
    }

    fn check_plain(&self, a: &SimCiphertext, p: &SimPlaintext) -> Result<()> {
        self.keys.check_key(a.key_id)?;
        if p.level < a.level {
            return Err(EngineError::LevelMismatch {
                left: a.level,
                right: p.level,
            });
        }
        Ok(())
    }

    fn zip_with(
        a: &SimCiphertext,
        b: &[f64],
        scale: f64,
        f: impl Fn(f64, f64) -> f64,
    ) -> SimCiphertext {
        SimCiphertext {
            values: a.values.iter().zip(b).map(|(&x, &y)| f(x, y)).collect(),
            level: a.level,
            scale,
            slots: a.slots,
            key_id: a.key_id,
        }
    }
}

impl ShallowCopy for SimEvaluator {
    fn shallow_copy(&self) -> Self {
        Self::new(self.keys.clone())
    }
}

impl Evaluator<Sim> for SimEvaluator {
    fn add(&mut self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.check_pair(a, b)?;
        Ok(Self::zip_with(a, &b.values, a.scale, |x, y| x + y))
    }

    fn sub(&mut self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.check_pair(a, b)?;
        Ok(Self::zip_with(a, &b.values, a.scale, |x, y| x - y))
    }

    fn neg(&mut self, a: &SimCiphertext) -> Result<SimCiphertext> {
        self.keys.check_key(a.key_id)?;
        let mut out = a.clone();
        out.values.iter_mut().for_each(|v| *v = -*v);
        Ok(out)
    }

    fn add_plain(&mut self, a: &SimCiphertext, p: &SimPlaintext) -> Result<SimCiphertext> {
        self.check_plain(a, p)?;
        Ok(Self::zip_with(a, &p.values, a.scale, |x, y| x + y))
    }

    fn mul_relin(&mut self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.check_pair(a, b)?;
        Ok(Self::zip_with(a, &b.values, a.scale * b.scale, |x, y| x * y))
    }

    fn mul_plain(&mut self, a: &SimCiphertext, p: &SimPlaintext) -> Result<SimCiphertext> {
        self.check_plain(a, p)?;
        if !p.ntt {
            return Err(EngineError::Backend(
                "plaintext multiplication requires NTT form".into(),
            ));
        }
        Ok(Self::zip_with(a, &p.values, a.scale * p.scale, |x, y| x * y))
    }

    fn mul_const(
        &mut self,
        a: &SimCiphertext,
        constant: f64,
        const_scale: f64,
    ) -> Result<SimCiphertext> {
        self.keys.check_key(a.key_id)?;
        let factor = constant * const_scale;
        let mut out = a.clone();
        out.values.iter_mut().for_each(|v| *v *= factor);
        out.scale *= const_scale;
        Ok(out)
    }

    fn rescale(&mut self, a: &mut SimCiphertext) -> Result<()> {
        self.keys.check_key(a.key_id)?;
        if a.level == 0 {
            return Err(EngineError::DepthExhausted { level: 0 });
        }
        let q = self.keys.params.moduli[a.level];
        a.values.iter_mut().for_each(|v| *v /= q);
        a.scale /= q;
        a.level -= 1;
        let sigma = self.keys.params.rescale_noise * a.scale;
        add_noise(&mut a.values, sigma, &mut self.rng)
    }

    fn drop_level(&mut self, a: &mut SimCiphertext, levels: usize) -> Result<()> {
        if levels > a.level {
            return Err(EngineError::InvalidParam(format!(
                "cannot drop {} levels from a level-{} ciphertext",
                levels, a.level
            )));
        }
        a.level -= levels;
        Ok(())
    }

    fn rotate(&mut self, a: &SimCiphertext, step: i64) -> Result<SimCiphertext> {
        self.keys.check_key(a.key_id)?;
        if !self.keys.has_rotation(step) {
            return Err(EngineError::MissingKey(format!("rotation by {step}")));
        }
        let n = a.values.len();
        let r = step.rem_euclid(n as i64) as usize;
        let mut out = a.clone();
        out.values.rotate_left(r);
        Ok(out)
    }

    fn has_rotation_key(&self, step: i64) -> bool {
        self.keys.has_rotation(step)
    }
}

pub struct SimEncoder {
    keys: Arc<SimKeys>,
}

impl ShallowCopy for SimEncoder {
    fn shallow_copy(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl Encoder<Sim> for SimEncoder {
    fn encode(
        &mut self,
        values: &[f64],
        level: usize,
        scale: f64,
        slots: usize,
    ) -> Result<SimPlaintext> {
        let params = &self.keys.params;
        if !slots.is_power_of_two() || slots > params.slots {
            return Err(EngineError::InvalidParam(format!(
                "cannot encode into {} slots (scheme has {})",
                slots, params.slots
            )));
        }
        if values.len() > slots {
            return Err(EngineError::DimensionMismatch {
                expected: slots,
                got: values.len(),
            });
        }
        if level > params.max_level {
            return Err(EngineError::InvalidParam(format!(
                "level {} above maximum {}",
                level, params.max_level
            )));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(EngineError::DegenerateScale(scale));
        }

        // Sparse packings repeat with period `slots` across the full ring.
        let values = (0..params.slots)
            .map(|j| values.get(j % slots).copied().unwrap_or(0.0) * scale)
            .collect();

        Ok(SimPlaintext {
            values,
            level,
            scale,
            slots,
            ntt: false,
        })
    }

    fn decode(&mut self, p: &SimPlaintext) -> Result<Vec<f64>> {
        if p.scale == 0.0 {
            return Err(EngineError::DegenerateScale(p.scale));
        }
        Ok(p.values[..p.slots].iter().map(|v| v / p.scale).collect())
    }

    fn to_ntt(&mut self, p: &mut SimPlaintext) -> Result<()> {
        p.ntt = true;
        Ok(())
    }
}

pub struct SimEncryptor {
    keys: Arc<SimKeys>,
    rng: ChaCha20Rng,
}

impl ShallowCopy for SimEncryptor {
    fn shallow_copy(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            rng: self.keys.fresh_rng(),
        }
    }
}

impl Encryptor<Sim> for SimEncryptor {
    fn encrypt(&mut self, p: &SimPlaintext) -> Result<SimCiphertext> {
        let mut values = p.values.clone();
        add_noise(&mut values, self.keys.params.fresh_noise * p.scale, &mut self.rng)?;
        Ok(SimCiphertext {
            values,
            level: p.level,
            scale: p.scale,
            slots: p.slots,
            key_id: self.keys.key_id,
        })
    }
}

pub struct SimDecryptor {
    keys: Arc<SimKeys>,
}

impl ShallowCopy for SimDecryptor {
    fn shallow_copy(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl Decryptor<Sim> for SimDecryptor {
    fn decrypt(&mut self, c: &SimCiphertext) -> Result<SimPlaintext> {
        self.keys.check_key(c.key_id)?;
        Ok(SimPlaintext {
            values: c.values.clone(),
            level: c.level,
            scale: c.scale,
            slots: c.slots,
            ntt: false,
        })
    }
}

pub struct SimBootstrapper {
    keys: Arc<SimKeys>,
    rng: ChaCha20Rng,
    count: Arc<AtomicUsize>,
}

impl SimBootstrapper {
    /// Number of bootstraps performed by this bootstrapper and all its copies.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl ShallowCopy for SimBootstrapper {
    fn shallow_copy(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            rng: self.keys.fresh_rng(),
            count: self.count.clone(),
        }
    }
}

impl Bootstrapper<Sim> for SimBootstrapper {
    fn bootstrap(&mut self, c: &SimCiphertext) -> Result<SimCiphertext> {
        self.keys.check_key(c.key_id)?;
        if c.scale <= 0.0 || !c.scale.is_finite() {
            return Err(EngineError::DegenerateScale(c.scale));
        }
        let params = &self.keys.params;
        let target = params.default_scale();
        let ratio = target / c.scale;
        let mut values: Vec<f64> = c.values.iter().map(|v| v * ratio).collect();
        add_noise(&mut values, params.bootstrap_noise * target, &mut self.rng)?;
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(SimCiphertext {
            values,
            level: params.max_level,
            scale: target,
            slots: c.slots,
            key_id: c.key_id,
        })
    }

    fn max_level(&self) -> usize {
        self.keys.params.max_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn setup() -> crate::backend::KeySet<Sim> {
        let params = params::compact().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        keygen(&params, &mut rng).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let mut keys = setup();
        let scale = 2f64.powi(40);
        let pt = keys.encoder.encode(&[1.5, -2.0, 3.25], 12, scale, 64).unwrap();
        let ct = keys.encryptor.encrypt(&pt).unwrap();
        let dec = keys.decryptor.as_mut().unwrap().decrypt(&ct).unwrap();
        let vals = keys.encoder.decode(&dec).unwrap();
        assert!((vals[0] - 1.5).abs() < 1e-5);
        assert!((vals[1] + 2.0).abs() < 1e-5);
        assert!((vals[2] - 3.25).abs() < 1e-5);
        assert!(vals[3].abs() < 1e-5);
    }

    #[test]
    fn test_sparse_encoding_repeats() {
        let mut keys = setup();
        let pt = keys.encoder.encode(&[1.0, 2.0], 3, 1024.0, 2).unwrap();
        assert_eq!(pt.values[0], 1024.0);
        assert_eq!(pt.values[2], 1024.0);
        assert_eq!(pt.values[3], 2048.0);
        assert_eq!(keys.encoder.decode(&pt).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_rescale_consumes_level() {
        let mut keys = setup();
        let scale = 2f64.powi(40);
        let pt = keys.encoder.encode(&[2.0], 12, scale, 64).unwrap();
        let ct = keys.encryptor.encrypt(&pt).unwrap();
        let mut sq = keys.evaluator.mul_relin(&ct, &ct).unwrap();
        assert_eq!(sq.level(), 12);
        keys.evaluator.rescale(&mut sq).unwrap();
        assert_eq!(sq.level(), 11);
        assert!(((sq.scale() - scale) / scale).abs() < 1e-5);
        let dec = keys.decryptor.as_mut().unwrap().decrypt(&sq).unwrap();
        assert!((keys.encoder.decode(&dec).unwrap()[0] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_mul_plain_requires_ntt() {
        let mut keys = setup();
        let pt = keys.encoder.encode(&[1.0], 12, 2f64.powi(40), 64).unwrap();
        let ct = keys.encryptor.encrypt(&pt).unwrap();
        assert!(matches!(
            keys.evaluator.mul_plain(&ct, &pt),
            Err(EngineError::Backend(_))
        ));
    }

    #[test]
    fn test_mismatched_scales_add_wrongly() {
        let mut keys = setup();
        let a = keys.encoder.encode(&[1.0], 5, 2f64.powi(40), 64).unwrap();
        let b = keys.encoder.encode(&[1.0], 5, 2f64.powi(30), 64).unwrap();
        let ca = keys.encryptor.encrypt(&a).unwrap();
        let cb = keys.encryptor.encrypt(&b).unwrap();
        let sum = keys.evaluator.add(&ca, &cb).unwrap();
        let dec = keys.decryptor.as_mut().unwrap().decrypt(&sum).unwrap();
        let v = keys.encoder.decode(&dec).unwrap()[0];
        assert!((v - 2.0).abs() > 0.5);
    }

    #[test]
    fn test_foreign_ciphertext_rejected() {
        let mut keys = setup();
        let params = params::compact().unwrap();
        let mut other = keygen(&params, &mut ChaCha20Rng::seed_from_u64(8)).unwrap();
        let pt = other.encoder.encode(&[1.0], 3, 1e6, 64).unwrap();
        let ct = other.encryptor.encrypt(&pt).unwrap();
        assert!(keys.decryptor.as_mut().unwrap().decrypt(&ct).is_err());
    }

    #[test]
    fn test_rotation_needs_key() {
        let params = params::compact().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let mut keys = keygen_with_steps(&params, &[1], &mut rng).unwrap();
        let pt = keys.encoder.encode(&[1.0, 2.0, 3.0], 3, 1e6, 64).unwrap();
        let ct = keys.encryptor.encrypt(&pt).unwrap();
        let rot = keys.evaluator.rotate(&ct, 1).unwrap();
        let dec = keys.decryptor.as_mut().unwrap().decrypt(&rot).unwrap();
        let vals = keys.encoder.decode(&dec).unwrap();
        assert!((vals[0] - 2.0).abs() < 1e-3);
        assert!(matches!(
            keys.evaluator.rotate(&ct, 2),
            Err(EngineError::MissingKey(_))
        ));
    }
}
