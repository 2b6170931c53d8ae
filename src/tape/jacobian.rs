//! Dense and compressed numeric Jacobians.

use crate::error::EvaluationError;
use crate::float::Float;
use crate::sparsity::Sparsity;

use super::{unit_seed, Evaluator, Seed, Tape};

impl<F: Float> Evaluator<'_, F> {
    /// Dense Jacobian of output `oind` with respect to input `iind`:
    /// `J[r][c] = ∂ y_nz[r] / ∂ x_nz[c]`.
    ///
    /// Uses forward sweeps when the input has no more nonzeros than the
    /// output, reverse sweeps otherwise, packing
    /// [`directions_per_sweep`](crate::EvalOptions::directions_per_sweep)
    /// directions into each sweep.
    pub fn jacobian<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        self.tape.check_input(iind)?;
        self.tape.check_output(oind)?;
        if self.tape.inputs[iind].slots.len() <= self.tape.outputs[oind].slots.len() {
            self.jacobian_forward(inputs, iind, oind)
        } else {
            self.jacobian_reverse(inputs, iind, oind)
        }
    }

    /// Dense Jacobian by forward sweeps, one direction per input nonzero.
    pub fn jacobian_forward<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        let tape = self.tape;
        tape.check_input(iind)?;
        tape.check_output(oind)?;
        let n_in = tape.inputs[iind].slots.len();
        let n_out = tape.outputs[oind].slots.len();
        let mut jac = vec![vec![F::zero(); n_in]; n_out];

        let chunk = self.options.directions_per_sweep.max(1);
        let mut start = 0;
        while start < n_in {
            let end = (start + chunk).min(n_in);
            let seeds: Vec<Seed<F>> = (start..end)
                .map(|c| unit_seed(&tape.inputs, iind, [c], F::zero(), F::one()))
                .collect();
            let res = self.forward_ad(inputs, &seeds)?;
            for (d, c) in (start..end).enumerate() {
                for (r, row) in jac.iter_mut().enumerate() {
                    row[c] = res.sensitivities[d][oind][r];
                }
            }
            start = end;
        }
        Ok(jac)
    }

    /// Dense Jacobian by reverse sweeps, one direction per output nonzero.
    pub fn jacobian_reverse<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        let tape = self.tape;
        tape.check_input(iind)?;
        tape.check_output(oind)?;
        let n_in = tape.inputs[iind].slots.len();
        let n_out = tape.outputs[oind].slots.len();
        let mut jac = vec![vec![F::zero(); n_in]; n_out];

        let chunk = self.options.directions_per_sweep.max(1);
        let mut start = 0;
        while start < n_out {
            let end = (start + chunk).min(n_out);
            let seeds: Vec<Seed<F>> = (start..end)
                .map(|r| unit_seed(&tape.outputs, oind, [r], F::zero(), F::one()))
                .collect();
            let mut res = self.reverse_ad(inputs, &seeds)?;
            for (d, r) in (start..end).enumerate() {
                jac[r] = std::mem::take(&mut res.sensitivities[d][iind]);
            }
            start = end;
        }
        Ok(jac)
    }

    /// Compressed Jacobian: the propagated pattern plus its values in
    /// nonzero order.
    ///
    /// Structurally orthogonal columns (or rows) share one seed direction,
    /// so the number of directions is the number of colors rather than the
    /// number of nonzeros. Whichever side needs fewer colors is used.
    pub fn sparse_jacobian<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<(Sparsity, Vec<F>), EvaluationError> {
        let tape = self.tape;
        let pattern = tape.jac_sparsity(iind, oind)?;
        let (col_colors, num_col_colors) = pattern.column_coloring();
        let (row_colors, num_row_colors) = pattern.row_coloring();
        let mut values = vec![F::zero(); pattern.nnz()];
        let chunk = self.options.directions_per_sweep.max(1) as u32;

        if num_col_colors <= num_row_colors {
            let mut first = 0u32;
            while first < num_col_colors {
                let last = (first + chunk).min(num_col_colors);
                let seeds: Vec<Seed<F>> = (first..last)
                    .map(|color| {
                        let cols = (0..pattern.ncol()).filter(|&c| col_colors[c] == color);
                        unit_seed(&tape.inputs, iind, cols, F::zero(), F::one())
                    })
                    .collect();
                let res = self.forward_ad(inputs, &seeds)?;
                for (k, (r, c)) in pattern.iter().enumerate() {
                    let color = col_colors[c];
                    if (first..last).contains(&color) {
                        values[k] = res.sensitivities[(color - first) as usize][oind][r];
                    }
                }
                first = last;
            }
        } else {
            let mut first = 0u32;
            while first < num_row_colors {
                let last = (first + chunk).min(num_row_colors);
                let seeds: Vec<Seed<F>> = (first..last)
                    .map(|color| {
                        let rows = (0..pattern.nrow()).filter(|&r| row_colors[r] == color);
                        unit_seed(&tape.outputs, oind, rows, F::zero(), F::one())
                    })
                    .collect();
                let res = self.reverse_ad(inputs, &seeds)?;
                for (k, (r, c)) in pattern.iter().enumerate() {
                    let color = row_colors[r];
                    if (first..last).contains(&color) {
                        values[k] = res.sensitivities[(color - first) as usize][iind][c];
                    }
                }
                first = last;
            }
        }
        Ok((pattern, values))
    }
}

impl Tape {
    /// One-shot [`Evaluator::jacobian`].
    pub fn jacobian<F: Float, I: AsRef<[F]>>(
        &self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        self.evaluator().jacobian(inputs, iind, oind)
    }

    /// One-shot [`Evaluator::sparse_jacobian`].
    pub fn sparse_jacobian<F: Float, I: AsRef<[F]>>(
        &self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<(Sparsity, Vec<F>), EvaluationError> {
        self.evaluator().sparse_jacobian(inputs, iind, oind)
    }
}
