//! Capability set of the underlying CKKS primitive.
//!
//! The engine never touches ring elements. It drives an [`Evaluator`],
//! [`Encoder`], [`Encryptor`], optional [`Decryptor`] and optional
//! [`Bootstrapper`] through these traits, and reads only the level/scale
//! metadata of ciphertexts and plaintexts.
//!
//! Every capability is split into immutable key material (shared by all
//! copies) and mutable scratch state. Scratch state is not safe for
//! concurrent use: tasks obtain their own copy through [`ShallowCopy`].

pub mod sim;

use std::fmt::Debug;

use crate::error::Result;

/// Metadata the engine needs from an opaque ciphertext.
pub trait HeCiphertext: Clone + Debug + Send + Sync {
    /// Remaining multiplicative depth.
    fn level(&self) -> usize;
    /// Fixed-point scaling factor of the encoded message.
    fn scale(&self) -> f64;
    /// Overwrite the scale metadata without touching the encoded data.
    fn set_scale(&mut self, scale: f64);
    /// Number of packed slots.
    fn slots(&self) -> usize;
}

/// Metadata the engine needs from an opaque plaintext.
pub trait HePlaintext: Clone + Debug + Send + Sync {
    fn level(&self) -> usize;
    fn scale(&self) -> f64;
    fn slots(&self) -> usize;
    /// Whether the plaintext is already in the NTT-ready form required by
    /// plaintext multiplication.
    fn is_ntt(&self) -> bool;
}

/// Produce a task-local copy that shares immutable key material with `self`
/// but owns fresh scratch state.
pub trait ShallowCopy {
    fn shallow_copy(&self) -> Self;
}

/// Type family tying one primitive's ciphertext, plaintext and capabilities
/// together.
pub trait Scheme: Sized + Send + Sync + 'static {
    type Ciphertext: HeCiphertext;
    type Plaintext: HePlaintext;
    type Evaluator: Evaluator<Self>;
    type Encoder: Encoder<Self>;
    type Encryptor: Encryptor<Self>;
    type Decryptor: Decryptor<Self>;
    type Bootstrapper: Bootstrapper<Self>;
}

/// Homomorphic arithmetic of the primitive.
///
/// Binary operations expect operands at the same level. Multiplications do
/// not rescale; the engine decides when to call [`Evaluator::rescale`].
pub trait Evaluator<S: Scheme>: ShallowCopy + Send + Sync {
    fn add(&mut self, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext>;
    fn sub(&mut self, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext>;
    fn neg(&mut self, a: &S::Ciphertext) -> Result<S::Ciphertext>;
    fn add_plain(&mut self, a: &S::Ciphertext, p: &S::Plaintext) -> Result<S::Ciphertext>;

    /// Tensor product followed by relinearization. The output scale is the
    /// product of the input scales.
    fn mul_relin(&mut self, a: &S::Ciphertext, b: &S::Ciphertext) -> Result<S::Ciphertext>;

    /// Multiply by an NTT-ready plaintext.
    fn mul_plain(&mut self, a: &S::Ciphertext, p: &S::Plaintext) -> Result<S::Ciphertext>;

    /// Multiply by `constant` encoded at `const_scale`. With `const_scale ==
    /// 1.0` the ciphertext scale is unchanged.
    fn mul_const(
        &mut self,
        a: &S::Ciphertext,
        constant: f64,
        const_scale: f64,
    ) -> Result<S::Ciphertext>;

    /// Divide by the modulus of the current level, consuming one level.
    fn rescale(&mut self, a: &mut S::Ciphertext) -> Result<()>;

    /// Drop `levels` levels. Metadata-only for the engine.
    fn drop_level(&mut self, a: &mut S::Ciphertext, levels: usize) -> Result<()>;

    /// Cyclic left rotation of the slots by a single key-backed step.
    fn rotate(&mut self, a: &S::Ciphertext, step: i64) -> Result<S::Ciphertext>;

    fn has_rotation_key(&self, step: i64) -> bool;
}

pub trait Encoder<S: Scheme>: ShallowCopy + Send + Sync {
    /// Encode `values` into a plaintext of `slots` slots. Missing values are
    /// zero; sparse packings repeat with period `slots`.
    fn encode(
        &mut self,
        values: &[f64],
        level: usize,
        scale: f64,
        slots: usize,
    ) -> Result<S::Plaintext>;

    fn decode(&mut self, p: &S::Plaintext) -> Result<Vec<f64>>;

    /// Move a plaintext into NTT-ready form in place.
    fn to_ntt(&mut self, p: &mut S::Plaintext) -> Result<()>;
}

pub trait Encryptor<S: Scheme>: ShallowCopy + Send + Sync {
    fn encrypt(&mut self, p: &S::Plaintext) -> Result<S::Ciphertext>;
}

pub trait Decryptor<S: Scheme>: ShallowCopy + Send + Sync {
    fn decrypt(&mut self, c: &S::Ciphertext) -> Result<S::Plaintext>;
}

pub trait Bootstrapper<S: Scheme>: ShallowCopy + Send + Sync {
    /// Refresh `c` to [`Bootstrapper::max_level`], preserving its message.
    fn bootstrap(&mut self, c: &S::Ciphertext) -> Result<S::Ciphertext>;
    fn max_level(&self) -> usize;
}

/// Fully formed key material and capabilities handed to the engine.
pub struct KeySet<S: Scheme> {
    pub evaluator: S::Evaluator,
    pub encoder: S::Encoder,
    pub encryptor: S::Encryptor,
    /// Absent for public (ciphertext-only) evaluation contexts.
    pub decryptor: Option<S::Decryptor>,
    pub bootstrapper: Option<S::Bootstrapper>,
    /// Slot count S of the scheme (a power of two).
    pub slots: usize,
    /// Level of a fresh ciphertext.
    pub max_level: usize,
}

impl<S: Scheme> KeySet<S> {
    /// Strip the decryptor, yielding a public evaluation key set.
    pub fn without_decryptor(mut self) -> Self {
        self.decryptor = None;
        self
    }

    pub fn without_bootstrapper(mut self) -> Self {
        self.bootstrapper = None;
        self
    }
}
