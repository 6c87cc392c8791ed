//! Slot-structure operations built from filters and rotations: extraction,
//! insertion, broadcast, outer product, transpose and packing.

use crate::backend::Scheme;
use crate::engine::{Engine, MulPolicy};
use crate::error::{EngineError, Result};

impl<S: Scheme> Engine<S> {
    /// Multiply by filter `index`. Costs one level.
    fn mask(&mut self, ct: &S::Ciphertext, index: usize) -> Result<S::Ciphertext> {
        let ctx = self.ctx.clone();
        let filter = ctx.filters.get(index).ok_or(EngineError::FilterOutOfRange {
            index,
            count: ctx.filters.len(),
        })?;
        self.multiply_plain(ct, filter, MulPolicy::AUTO)
    }

    /// Keep slot `index`, zero every other slot.
    pub fn extract(&mut self, ct: &S::Ciphertext, index: usize) -> Result<S::Ciphertext> {
        self.mask(ct, index)
    }

    /// Add slot `from` of `src` into slot `to` of `dst`.
    pub fn insert(
        &mut self,
        dst: &mut S::Ciphertext,
        src: &S::Ciphertext,
        from: usize,
        to: usize,
    ) -> Result<()> {
        let isolated = self.extract(src, from)?;
        let moved = self.rotate(&isolated, from as i64 - to as i64)?;
        self.add_assign(dst, &moved)
    }

    /// Replicate slot `slot` into slots `0..width` (and up to the next power
    /// of two). Other slots are zero.
    pub fn broadcast(
        &mut self,
        ct: &S::Ciphertext,
        slot: usize,
        width: usize,
    ) -> Result<S::Ciphertext> {
        if width == 0 || width > self.slots() {
            return Err(EngineError::InvalidParam(format!(
                "broadcast width {width} outside 1..={}",
                self.slots()
            )));
        }
        let isolated = self.extract(ct, slot)?;
        let mut out = self.rotate(&isolated, slot as i64)?;
        let span = width.next_power_of_two();
        let mut shift = 1usize;
        while shift < span {
            let spread = self.rotate(&out, -(shift as i64))?;
            self.add_assign(&mut out, &spread)?;
            shift <<= 1;
        }
        Ok(out)
    }

    /// Outer product of packed vectors: `out[i]` holds `a[i] · b` in slots
    /// `0..b_size`.
    ///
    /// Wide operands (`b_size > S/4`) spread `a[i]` by a full reduction of
    /// the extracted slot, narrow ones by a bounded broadcast.
    #[tracing::instrument(skip_all, fields(a_size = a_size, b_size = b_size, concurrent = concurrent))]
    pub fn outer(
        &mut self,
        a: &S::Ciphertext,
        b: &S::Ciphertext,
        a_size: usize,
        b_size: usize,
        concurrent: bool,
    ) -> Result<Vec<S::Ciphertext>> {
        if a_size == 0 || b_size == 0 || b_size > self.slots() {
            return Err(EngineError::InvalidParam(format!(
                "outer sizes {a_size}x{b_size} with {} slots",
                self.slots()
            )));
        }
        if a_size > self.filter_count() {
            return Err(EngineError::FilterOutOfRange {
                index: a_size - 1,
                count: self.filter_count(),
            });
        }
        let wide = b_size > self.slots() / 4;
        self.fan_out(a_size, concurrent, |engine, i| {
            let spread = if wide {
                let isolated = engine.extract(a, i)?;
                engine.sum_elements(&isolated)?
            } else {
                engine.broadcast(a, i, b_size)?
            };
            engine.multiply(&spread, b, MulPolicy::AUTO)
        })
    }

    /// Transpose a `rows.len() × columns` matrix packed one row per
    /// ciphertext into `columns` ciphertexts of `rows.len()` slots each.
    ///
    /// Row r is rotated right by r so that its element c lands in slot
    /// r + c; column c is then gathered with filter r + c and rotated back.
    /// Needs `rows + columns - 1` filters.
    #[tracing::instrument(skip_all, fields(rows = rows.len(), columns = columns, concurrent = concurrent))]
    pub fn transpose(
        &mut self,
        rows: &[S::Ciphertext],
        columns: usize,
        concurrent: bool,
    ) -> Result<Vec<S::Ciphertext>> {
        if rows.is_empty() || columns == 0 {
            return Err(EngineError::InvalidParam("empty matrix".into()));
        }
        let needed = rows.len() + columns - 1;
        if needed > self.filter_count() {
            return Err(EngineError::FilterOutOfRange {
                index: needed - 1,
                count: self.filter_count(),
            });
        }
        let shifted = self.fan_out(rows.len(), concurrent, |engine, r| {
            engine.rotate(&rows[r], -(r as i64))
        })?;
        self.fan_out(columns, concurrent, |engine, c| {
            let mut acc = engine.mask(&shifted[0], c)?;
            for (r, row) in shifted.iter().enumerate().skip(1) {
                let picked = engine.mask(row, r + c)?;
                engine.add_assign(&mut acc, &picked)?;
            }
            engine.rotate(&acc, c as i64)
        })
    }

    /// Gather slot i of `cts[i]` into slot i of one ciphertext.
    pub fn pack_vector(&mut self, cts: &[S::Ciphertext]) -> Result<S::Ciphertext> {
        let (first, rest) = cts
            .split_first()
            .ok_or_else(|| EngineError::InvalidParam("nothing to pack".into()))?;
        if cts.len() > self.filter_count() {
            return Err(EngineError::FilterOutOfRange {
                index: cts.len() - 1,
                count: self.filter_count(),
            });
        }
        let mut acc = self.mask(first, 0)?;
        for (i, ct) in rest.iter().enumerate() {
            let picked = self.mask(ct, i + 1)?;
            self.add_assign(&mut acc, &picked)?;
        }
        Ok(acc)
    }
}
