use std::collections::BTreeSet;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use rand::Rng;
use zeroize::Zeroize;

use crate::backend::sim::{
    Sim, SimBootstrapper, SimDecryptor, SimEncoder, SimEncryptor, SimEvaluator, SimKeys,
    SimParams,
};
use crate::backend::KeySet;
use crate::engine::rotate::rotation_steps;
use crate::error::{EngineError, Result};

/// Generate a full key set with rotation keys for every `±2^i < S`.
pub fn keygen<R: Rng>(params: &Arc<SimParams>, rng: &mut R) -> Result<KeySet<Sim>> {
    let steps = rotation_steps(params.slots);
    keygen_with_steps(params, &steps, rng)
}

/// Generate a key set holding rotation keys for `steps` only.
pub fn keygen_with_steps<R: Rng>(
    params: &Arc<SimParams>,
    steps: &[i64],
    rng: &mut R,
) -> Result<KeySet<Sim>> {
    let s = params.slots as i64;
    if let Some(&bad) = steps.iter().find(|&&k| k == 0 || k.abs() >= s) {
        return Err(EngineError::InvalidParam(format!(
            "rotation step {bad} outside (-{s}, {s})"
        )));
    }

    let mut secret = [0u8; 32];
    rng.fill(&mut secret);
    let keys = Arc::new(SimKeys::new(
        params.clone(),
        &secret,
        steps.iter().copied().collect::<BTreeSet<_>>(),
    ));
    secret.zeroize();

    Ok(KeySet {
        evaluator: SimEvaluator::new(keys.clone()),
        encoder: SimEncoder { keys: keys.clone() },
        encryptor: SimEncryptor {
            keys: keys.clone(),
            rng: keys.fresh_rng(),
        },
        decryptor: Some(SimDecryptor { keys: keys.clone() }),
        bootstrapper: Some(SimBootstrapper {
            keys: keys.clone(),
            rng: keys.fresh_rng(),
            count: Arc::new(AtomicUsize::new(0)),
        }),
        slots: params.slots,
        max_level: params.max_level,
    })
}
