//! Nonlinear functions realized as pre-fitted polynomials.
//!
//! The set is closed: every activation and kernel carries its coefficients
//! or parameters and is dispatched by `match`.

use std::sync::Arc;

use crate::backend::Scheme;
use crate::engine::{Engine, MulPolicy};
use crate::error::{EngineError, Result};
use crate::poly::Polynomial;

const SIGMOID: [f64; 4] = [0.5, 0.197, 0.0, -0.004];
const TANH: [f64; 4] = [0.0, 0.788, 0.0, -0.064];
/// Taylor expansion of `e^x` to degree 7; used as the softmax numerator.
const EXP: [f64; 8] = [
    1.0,
    1.0,
    0.5,
    1.0 / 6.0,
    1.0 / 24.0,
    1.0 / 120.0,
    1.0 / 720.0,
    1.0 / 5040.0,
];
const RELU: [f64; 3] = [0.375, 0.5, 0.117_187_5];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Exp,
    Relu,
    Identity,
}

impl Activation {
    /// Coefficients by ascending degree. Identity has none.
    pub fn coefficients(self) -> &'static [f64] {
        match self {
            Activation::Sigmoid => &SIGMOID,
            Activation::Tanh => &TANH,
            Activation::Exp => &EXP,
            Activation::Relu => &RELU,
            Activation::Identity => &[],
        }
    }

    /// A fresh fitted polynomial; `None` for the identity. The engine keeps
    /// its own shared copy, see [`Engine::activation_polynomial`].
    pub fn polynomial<S: Scheme>(self) -> Result<Option<Polynomial<S>>> {
        match self {
            Activation::Identity => Ok(None),
            other => Polynomial::from_coefficients(other.coefficients()).map(Some),
        }
    }

    /// Plaintext value of the approximation.
    pub fn eval_plain(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            other => other
                .coefficients()
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * x + c),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kernel {
    /// `<a, b>`
    Linear,
    /// `(<a, b> + offset)^degree`
    Polynomial { degree: u32, offset: f64 },
    /// `exp(-gamma · |a - b|²)`
    Rbf { gamma: f64 },
}

impl Kernel {
    pub fn eval_plain(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Kernel::Linear => dot(a, b),
            Kernel::Polynomial { degree, offset } => (dot(a, b) + offset).powi(degree as i32),
            Kernel::Rbf { gamma } => {
                let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                Activation::Exp.eval_plain(-gamma * d2)
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl<S: Scheme> Engine<S> {
    /// Fitted polynomial of `act`, shared by every copy of this engine so
    /// its coefficient encodings are reused. `None` for the identity.
    pub fn activation_polynomial(&self, act: Activation) -> Result<Option<Arc<Polynomial<S>>>> {
        if act == Activation::Identity {
            return Ok(None);
        }
        let poisoned = || EngineError::Backend("activation cache poisoned".into());
        {
            let cache = self.activation_cache().read().map_err(|_| poisoned())?;
            if let Some(hit) = cache.get(&act) {
                return Ok(Some(hit.clone()));
            }
        }
        let built = Arc::new(Polynomial::from_coefficients(act.coefficients())?);
        let mut cache = self.activation_cache().write().map_err(|_| poisoned())?;
        Ok(Some(cache.entry(act).or_insert(built).clone()))
    }

    /// Apply `act` slot-wise over the first `size` slots.
    pub fn activate(
        &mut self,
        x: &S::Ciphertext,
        act: Activation,
        size: usize,
        concurrent: bool,
    ) -> Result<S::Ciphertext> {
        match self.activation_polynomial(act)? {
            None => Ok(x.clone()),
            Some(poly) => self.evaluate_degree_n(x, &poly, size, concurrent),
        }
    }

    /// Kernel value of two packed vectors, replicated in every slot.
    pub fn kernel(
        &mut self,
        a: &S::Ciphertext,
        b: &S::Ciphertext,
        kernel: Kernel,
    ) -> Result<S::Ciphertext> {
        match kernel {
            Kernel::Linear => self.dot_product(a, b, MulPolicy::AUTO),
            Kernel::Polynomial { degree, offset } => {
                if degree == 0 {
                    return Err(EngineError::InvalidParam("kernel degree must be positive".into()));
                }
                let d = self.dot_product(a, b, MulPolicy::AUTO)?;
                let base = self.add_const(&d, offset)?;
                self.power(&base, degree)
            }
            Kernel::Rbf { gamma } => {
                let diff = self.sub(a, b)?;
                let d2 = self.dot_product(&diff, &diff, MulPolicy::AUTO)?;
                let arg = self.multiply_const(&d2, -gamma, MulPolicy::AUTO)?;
                let slots = self.slots();
                self.activate(&arg, Activation::Exp, slots, false)
            }
        }
    }

    /// Square-and-multiply, `e >= 1`.
    fn power(&mut self, base: &S::Ciphertext, e: u32) -> Result<S::Ciphertext> {
        let mut result: Option<S::Ciphertext> = None;
        let mut sq = base.clone();
        let mut e = e;
        loop {
            if e & 1 == 1 {
                result = Some(match result {
                    None => sq.clone(),
                    Some(r) => self.multiply(&r, &sq, MulPolicy::AUTO)?,
                });
            }
            e >>= 1;
            if e == 0 {
                break;
            }
            sq = self.multiply(&sq, &sq, MulPolicy::AUTO)?;
        }
        result.ok_or_else(|| EngineError::InvalidParam("zero exponent".into()))
    }
}
