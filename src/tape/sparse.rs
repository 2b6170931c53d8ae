//! Structural sparsity propagation over `u64` dependency masks.
//!
//! Seeds are processed in batches of the mask width: each seed nonzero of a
//! batch gets its own bit, the tape runs over [`Bits`], and the resulting
//! masks are read back as `(output nonzero, input nonzero)` pairs. The
//! pattern is conservative: cancellation is never exploited.

use crate::algebra::Bits;
use crate::backend::{Sequential, SparsityBackend};
use crate::error::EvaluationError;
use crate::opcode::OpCode;
use crate::sparsity::Sparsity;

use super::Tape;

/// Mask width of the CPU backends.
pub(crate) const BATCH_BITS: usize = 64;

/// Which side the propagation is seeded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Seed input nonzeros, read output masks.
    Forward,
    /// Seed output nonzeros, read input masks.
    Adjoint,
}

impl Tape {
    /// Number of seed nonzeros for a propagation in `dir`.
    pub(crate) fn num_seeds(&self, iind: usize, oind: usize, dir: Direction) -> usize {
        match dir {
            Direction::Forward => self.inputs[iind].slots.len(),
            Direction::Adjoint => self.outputs[oind].slots.len(),
        }
    }

    pub(crate) fn num_batches(&self, iind: usize, oind: usize, dir: Direction, width: usize) -> usize {
        self.num_seeds(iind, oind, dir).div_ceil(width)
    }

    /// Seeding for one batch as `(slot, mask)` pairs.
    ///
    /// Two seed nonzeros may share a slot (repeated outputs); callers OR
    /// the masks together.
    pub(crate) fn seed_batch(
        &self,
        iind: usize,
        oind: usize,
        dir: Direction,
        batch: usize,
        width: usize,
    ) -> Vec<(usize, u64)> {
        let slots = match dir {
            Direction::Forward => &self.inputs[iind].slots,
            Direction::Adjoint => &self.outputs[oind].slots,
        };
        let start = batch * width;
        let end = (start + width).min(slots.len());
        (start..end)
            .map(|k| (slots[k] as usize, 1u64 << (k - start)))
            .collect()
    }

    /// Decode the masks left in `work` after a batch into
    /// `(output nonzero, input nonzero)` pairs.
    pub(crate) fn read_batch(
        &self,
        iind: usize,
        oind: usize,
        dir: Direction,
        batch: usize,
        width: usize,
        work: &[u64],
        pairs: &mut Vec<(usize, usize)>,
    ) {
        let slots = match dir {
            Direction::Forward => &self.outputs[oind].slots,
            Direction::Adjoint => &self.inputs[iind].slots,
        };
        for (k, &s) in slots.iter().enumerate() {
            let mut bits = work[s as usize];
            while bits != 0 {
                let seed = batch * width + bits.trailing_zeros() as usize;
                bits &= bits - 1;
                pairs.push(match dir {
                    Direction::Forward => (k, seed),
                    Direction::Adjoint => (seed, k),
                });
            }
        }
    }

    /// Partials of the mask algebra: all-ones except for constants.
    pub(crate) fn bit_partials(&self) -> Vec<(u64, u64)> {
        self.instructions
            .iter()
            .map(|ins| if ins.op == OpCode::Const { (0, 0) } else { (!0, !0) })
            .collect()
    }

    /// Run one 64-wide batch on the CPU, appending its pairs.
    ///
    /// `work` is scratch space of any length; `partials` comes from
    /// [`bit_partials`](Self::bit_partials) and is only read in adjoint mode.
    pub(crate) fn propagate_batch(
        &self,
        iind: usize,
        oind: usize,
        dir: Direction,
        batch: usize,
        partials: &[(u64, u64)],
        work: &mut Vec<u64>,
        pairs: &mut Vec<(usize, usize)>,
    ) {
        work.clear();
        work.resize(self.num_slots, 0);
        for (s, mask) in self.seed_batch(iind, oind, dir, batch, BATCH_BITS) {
            work[s] |= mask;
        }
        match dir {
            Direction::Forward => {
                let swept = self.sweep_primal(&mut Bits, work);
                debug_assert!(swept.is_ok());
            }
            Direction::Adjoint => self.sweep_adjoint(&mut Bits, partials, work, 1),
        }
        let before = pairs.len();
        self.read_batch(iind, oind, dir, batch, BATCH_BITS, work, pairs);
        log::trace!(
            "sparsity batch {batch} ({dir:?}, input {iind}, output {oind}): {} entries",
            pairs.len() - before
        );
    }

    /// Jacobian pattern of output block `oind` with respect to input block
    /// `iind`, `n_out_nz x n_in_nz`.
    pub(crate) fn pattern_from_pairs(
        &self,
        iind: usize,
        oind: usize,
        pairs: &[(usize, usize)],
    ) -> Sparsity {
        let mut columns = vec![Vec::new(); self.inputs[iind].slots.len()];
        for &(r, c) in pairs {
            columns[c].push(r);
        }
        Sparsity::from_columns(self.outputs[oind].slots.len(), columns)
    }

    /// Direction needing fewer batches; forward on ties.
    pub fn preferred_direction(
        &self,
        iind: usize,
        oind: usize,
    ) -> Result<Direction, EvaluationError> {
        self.check_input(iind)?;
        self.check_output(oind)?;
        let fwd = self.inputs[iind].slots.len().div_ceil(BATCH_BITS);
        let adj = self.outputs[oind].slots.len().div_ceil(BATCH_BITS);
        Ok(if fwd <= adj {
            Direction::Forward
        } else {
            Direction::Adjoint
        })
    }

    /// Sequential Jacobian sparsity in the cheaper direction.
    ///
    /// Rows are the nonzeros of output `oind`, columns the nonzeros of
    /// input `iind`. Both directions give the same pattern.
    pub fn jac_sparsity(&self, iind: usize, oind: usize) -> Result<Sparsity, EvaluationError> {
        self.jac_sparsity_dir(iind, oind, self.preferred_direction(iind, oind)?)
    }

    /// Sequential Jacobian sparsity in an explicit direction.
    pub fn jac_sparsity_dir(
        &self,
        iind: usize,
        oind: usize,
        dir: Direction,
    ) -> Result<Sparsity, EvaluationError> {
        self.check_input(iind)?;
        self.check_output(oind)?;
        let partials = match dir {
            Direction::Forward => Vec::new(),
            Direction::Adjoint => self.bit_partials(),
        };
        let mut work = Vec::new();
        let mut pairs = Vec::new();
        for batch in 0..self.num_batches(iind, oind, dir, BATCH_BITS) {
            self.propagate_batch(iind, oind, dir, batch, &partials, &mut work, &mut pairs);
        }
        Ok(self.pattern_from_pairs(iind, oind, &pairs))
    }

    /// Jacobian sparsity computed by an explicitly chosen backend.
    pub fn jac_sparsity_with(
        &self,
        backend: &dyn SparsityBackend,
        iind: usize,
        oind: usize,
        dir: Direction,
    ) -> crate::error::Result<Sparsity> {
        self.check_input(iind)?;
        self.check_output(oind)?;
        backend.propagate(self, iind, oind, dir)
    }

    /// For every nonzero of output `oind`, the input nonzeros of block
    /// `iind` it may depend on, ascending.
    pub fn dependency_sets(
        &self,
        iind: usize,
        oind: usize,
    ) -> Result<Vec<Vec<usize>>, EvaluationError> {
        let pattern = self.jac_sparsity(iind, oind)?;
        let mut sets = vec![Vec::new(); pattern.nrow()];
        for (r, c) in pattern.iter() {
            sets[r].push(c);
        }
        Ok(sets)
    }

    /// Whether any nonzero of output `oind` depends on input `iind`.
    pub fn depends_on(&self, iind: usize, oind: usize) -> Result<bool, EvaluationError> {
        Ok(!self.jac_sparsity(iind, oind)?.is_empty())
    }
}

impl SparsityBackend for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn propagate(
        &self,
        tape: &Tape,
        iind: usize,
        oind: usize,
        dir: Direction,
    ) -> crate::error::Result<Sparsity> {
        Ok(tape.jac_sparsity_dir(iind, oind, dir)?)
    }
}
