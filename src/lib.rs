//! # ckks-engine: level- and scale-aware evaluation over leveled CKKS
//!
//! The engine sits on top of an approximate-arithmetic HE primitive (any
//! type implementing [`backend::Scheme`]) and hides the bookkeeping that
//! primitive leaves to the caller:
//!
//! - operands are brought to a common level and scale before every binary
//!   operation;
//! - products are rescaled and, once their level reaches the bootstrap
//!   threshold, refreshed;
//! - rotations by arbitrary shifts are decomposed over power-of-two keys;
//! - packed slots can be extracted, broadcast, transposed and reduced
//!   without decryption;
//! - nonlinear functions are evaluated as fitted polynomials;
//! - independent sub-computations fan out over rayon with per-task engine
//!   copies and merge through a mutex-guarded sum.
//!
//! [`backend::sim`] is an insecure reference primitive for tests and
//! benchmarks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ckks_engine::prelude::*;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let sim_params = ckks_engine::backend::sim::params::compact().unwrap();
//! let keys = ckks_engine::backend::sim::keygen(&sim_params, &mut ChaCha20Rng::seed_from_u64(7)).unwrap();
//! let mut engine = Engine::new(keys, ckks_engine::params::presets::compact().unwrap()).unwrap();
//!
//! let a = engine.encrypt(&[1.0, 2.0, 3.0]).unwrap();
//! let b = engine.encrypt(&[4.0, 5.0, 6.0]).unwrap();
//! let dot = engine.dot_product(&a, &b, MulPolicy::AUTO).unwrap();
//! assert!((engine.decrypt(&dot).unwrap()[0] - 32.0).abs() < 1e-2);
//! ```

pub mod activation;
pub mod backend;
pub mod engine;
pub mod error;
pub mod params;
pub mod poly;

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::activation::{Activation, Kernel};
    pub use crate::backend::{HeCiphertext, HePlaintext, KeySet, Scheme};
    pub use crate::engine::rotate::{find_step, rotation_steps};
    pub use crate::engine::{Engine, MulPolicy, SafeSum};
    pub use crate::error::{EngineError, Result};
    pub use crate::params::{EngineParams, EngineParamsBuilder};
    pub use crate::poly::Polynomial;
}
