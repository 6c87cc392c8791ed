//! Fan-out of independent units of work over shallow engine copies.
//!
//! Every parallel unit runs on its own [`Engine::shallow_copy`]: the context
//! and key material are shared, the evaluator scratch is not. Units are
//! joined by rayon before the call returns, a panic in any unit propagates
//! to the caller, and the first error is returned.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::backend::Scheme;
use crate::engine::{Engine, MulPolicy};
use crate::error::{EngineError, Result};

/// Mutex-guarded running sum of ciphertexts. The first writer initializes
/// it; later writers add into it.
pub struct SafeSum<C> {
    acc: Mutex<Option<C>>,
}

impl<C> SafeSum<C> {
    pub fn new() -> Self {
        Self {
            acc: Mutex::new(None),
        }
    }

    pub fn add<S>(&self, engine: &mut Engine<S>, ct: C) -> Result<()>
    where
        S: Scheme<Ciphertext = C>,
    {
        let mut guard = self
            .acc
            .lock()
            .map_err(|_| EngineError::Backend("accumulator lock poisoned".into()))?;
        match guard.as_mut() {
            None => *guard = Some(ct),
            Some(acc) => engine.add_assign(acc, &ct)?,
        }
        Ok(())
    }

    pub fn into_inner(self) -> Result<Option<C>> {
        self.acc
            .into_inner()
            .map_err(|_| EngineError::Backend("accumulator lock poisoned".into()))
    }
}

impl<C> Default for SafeSum<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheme> Engine<S> {
    /// Run `f` for every index in `0..n`, returning results in index order.
    pub fn fan_out<T, F>(&mut self, n: usize, concurrent: bool, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&mut Engine<S>, usize) -> Result<T> + Sync,
    {
        if !concurrent {
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                out.push(f(self, i)?);
            }
            return Ok(out);
        }
        let workers: Vec<Engine<S>> = (0..n).map(|_| self.shallow_copy()).collect();
        workers
            .into_par_iter()
            .enumerate()
            .map(|(i, mut worker)| f(&mut worker, i))
            .collect()
    }

    /// Run `f` for every index in `0..n` and sum the ciphertexts it yields.
    /// Arrival order is irrelevant: the merge is an encrypted addition.
    pub fn fan_in<F>(&mut self, n: usize, concurrent: bool, f: F) -> Result<S::Ciphertext>
    where
        F: Fn(&mut Engine<S>, usize) -> Result<S::Ciphertext> + Sync,
    {
        let sum = SafeSum::new();
        if concurrent {
            let workers: Vec<Engine<S>> = (0..n).map(|_| self.shallow_copy()).collect();
            workers
                .into_par_iter()
                .enumerate()
                .try_for_each(|(i, mut worker)| {
                    let ct = f(&mut worker, i)?;
                    sum.add(&mut worker, ct)
                })?;
        } else {
            for i in 0..n {
                let ct = f(self, i)?;
                sum.add(self, ct)?;
            }
        }
        sum.into_inner()?
            .ok_or_else(|| EngineError::InvalidParam("nothing to sum".into()))
    }

    /// `Σ a[i] · b[i]`, slot-wise.
    #[tracing::instrument(skip_all, fields(n = a.len(), concurrent = concurrent))]
    pub fn inter_dot_product(
        &mut self,
        a: &[S::Ciphertext],
        b: &[S::Ciphertext],
        concurrent: bool,
    ) -> Result<S::Ciphertext> {
        check_lengths(a.len(), b.len())?;
        self.fan_in(a.len(), concurrent, |engine, i| {
            engine.multiply(&a[i], &b[i], MulPolicy::AUTO)
        })
    }

    /// `[a[i] · b[i]]`.
    #[tracing::instrument(skip_all, fields(n = a.len(), concurrent = concurrent))]
    pub fn inter_multiply(
        &mut self,
        a: &[S::Ciphertext],
        b: &[S::Ciphertext],
        concurrent: bool,
    ) -> Result<Vec<S::Ciphertext>> {
        check_lengths(a.len(), b.len())?;
        self.fan_out(a.len(), concurrent, |engine, i| {
            engine.multiply(&a[i], &b[i], MulPolicy::AUTO)
        })
    }

    /// Dense matrix × vector: row i of the matrix is packed in `rows[i]`.
    /// Output slot i holds `<rows[i], v>`.
    #[tracing::instrument(skip_all, fields(rows = rows.len(), concurrent = concurrent))]
    pub fn matrix_vector(
        &mut self,
        rows: &[S::Ciphertext],
        v: &S::Ciphertext,
        concurrent: bool,
    ) -> Result<S::Ciphertext> {
        let dots = self.fan_out(rows.len(), concurrent, |engine, i| {
            engine.dot_product(&rows[i], v, MulPolicy::AUTO)
        })?;
        self.pack_vector(&dots)
    }

    /// Refresh every ciphertext to the maximum level.
    #[tracing::instrument(skip_all, fields(n = cts.len(), concurrent = concurrent))]
    pub fn bootstrap_many(&mut self, cts: &mut [S::Ciphertext], concurrent: bool) -> Result<()> {
        if self.bootstrapper.is_none() {
            return Err(EngineError::MissingBootstrapper);
        }
        if !concurrent {
            for ct in cts.iter_mut() {
                self.bootstrap(ct)?;
            }
            return Ok(());
        }
        let workers: Vec<Engine<S>> = (0..cts.len()).map(|_| self.shallow_copy()).collect();
        cts.par_iter_mut()
            .zip(workers.into_par_iter())
            .try_for_each(|(ct, mut worker)| worker.bootstrap(ct))
    }
}

fn check_lengths(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(EngineError::DimensionMismatch {
            expected: a,
            got: b,
        });
    }
    if a == 0 {
        return Err(EngineError::InvalidParam("empty operand arrays".into()));
    }
    Ok(())
}
