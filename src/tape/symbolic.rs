//! Symbolic sweeps: the tape re-emitted as new graph expressions.
//!
//! Values are 1x1 [`ExprId`]s, one per nonzero. Results are ordinary graph
//! nodes, so they can be built into new tapes and differentiated again.

use crate::algebra::{Algebra, Symbolic};
use crate::error::{EvaluationError, Result};
use crate::graph::{ExprGraph, ExprId};
use crate::sparsity::Sparsity;

use super::{check_seeds, unit_seed, Derivatives, IoBlock, Seed, Tape};

impl Tape {
    /// Working array with the input entries loaded.
    fn symbolic_work(&self, graph: &ExprGraph, inputs: &[Vec<ExprId>]) -> Result<Vec<ExprId>> {
        if inputs.len() != self.inputs.len() {
            return Err(EvaluationError::InputCount {
                expected: self.inputs.len(),
                found: inputs.len(),
            }
            .into());
        }
        let mut work = vec![ExprId::ZERO; self.num_slots];
        for (i, (block, values)) in self.inputs.iter().zip(inputs).enumerate() {
            if values.len() != block.slots.len() {
                return Err(EvaluationError::InputLength {
                    input: i,
                    expected: block.slots.len(),
                    found: values.len(),
                }
                .into());
            }
            for (&s, &v) in block.slots.iter().zip(values) {
                graph.check(v)?;
                work[s as usize] = v;
            }
        }
        Ok(work)
    }

    fn symbolic_failure(&self, instruction: usize) -> crate::error::Error {
        EvaluationError::Domain {
            instruction,
            op: self.instructions[instruction].op,
        }
        .into()
    }

    fn read_blocks(blocks: &[IoBlock], values: &[ExprId], ndir: usize, d: usize) -> Seed<ExprId> {
        blocks
            .iter()
            .map(|b| b.slots.iter().map(|&s| values[s as usize * ndir + d]).collect())
            .collect()
    }

    /// Output entries as expressions of the given input entries.
    ///
    /// `inputs[i]` holds one 1x1 expression per nonzero of input block `i`.
    pub fn eval_symbolic(
        &self,
        graph: &mut ExprGraph,
        inputs: &[Vec<ExprId>],
    ) -> Result<Vec<Vec<ExprId>>> {
        let mut work = self.symbolic_work(graph, inputs)?;
        let mut alg = Symbolic::new(graph);
        if let Err(k) = self.sweep_primal(&mut alg, &mut work) {
            return Err(self.symbolic_failure(k));
        }
        Ok(Self::read_blocks(&self.outputs, &work, 1, 0))
    }

    /// Symbolic counterpart of [`Tape::forward_ad`].
    pub fn forward_symbolic(
        &self,
        graph: &mut ExprGraph,
        inputs: &[Vec<ExprId>],
        seeds: &[Seed<ExprId>],
    ) -> Result<Derivatives<ExprId>> {
        check_seeds(&self.inputs, seeds)?;
        let mut work = self.symbolic_work(graph, inputs)?;
        let ndir = seeds.len();
        let mut tangents = vec![ExprId::ZERO; self.num_slots * ndir];
        for (d, seed) in seeds.iter().enumerate() {
            for (block, values) in self.inputs.iter().zip(seed) {
                for (&s, &v) in block.slots.iter().zip(values) {
                    graph.check(v)?;
                    tangents[s as usize * ndir + d] = v;
                }
            }
        }

        let mut alg = Symbolic::new(graph);
        if let Err(k) = self.sweep_tangent(&mut alg, &mut work, &mut tangents, ndir) {
            return Err(self.symbolic_failure(k));
        }
        Ok(Derivatives {
            outputs: Self::read_blocks(&self.outputs, &work, 1, 0),
            sensitivities: (0..ndir)
                .map(|d| Self::read_blocks(&self.outputs, &tangents, ndir, d))
                .collect(),
        })
    }

    /// Symbolic counterpart of [`Tape::reverse_ad`].
    pub fn reverse_symbolic(
        &self,
        graph: &mut ExprGraph,
        inputs: &[Vec<ExprId>],
        seeds: &[Seed<ExprId>],
    ) -> Result<Derivatives<ExprId>> {
        check_seeds(&self.outputs, seeds)?;
        for &v in seeds.iter().flatten().flatten() {
            graph.check(v)?;
        }
        let mut work = self.symbolic_work(graph, inputs)?;
        let mut alg = Symbolic::new(graph);
        let mut partials = Vec::new();
        if let Err(k) = self.sweep_primal_partials(&mut alg, &mut work, &mut partials) {
            return Err(self.symbolic_failure(k));
        }

        let ndir = seeds.len();
        let mut adjoints = vec![ExprId::ZERO; self.num_slots * ndir];
        for (d, seed) in seeds.iter().enumerate() {
            for (block, values) in self.outputs.iter().zip(seed) {
                for (&s, v) in block.slots.iter().zip(values) {
                    let i = s as usize * ndir + d;
                    adjoints[i] = alg.add(&adjoints[i], v);
                }
            }
        }
        self.sweep_adjoint(&mut alg, &partials, &mut adjoints, ndir);

        Ok(Derivatives {
            outputs: Self::read_blocks(&self.outputs, &work, 1, 0),
            sensitivities: (0..ndir)
                .map(|d| Self::read_blocks(&self.inputs, &adjoints, ndir, d))
                .collect(),
        })
    }

    /// Entries of every declared input matrix, checked against the blocks.
    fn input_entries(&self, graph: &mut ExprGraph, inputs: &[ExprId]) -> Result<Vec<Vec<ExprId>>> {
        if inputs.len() != self.inputs.len() {
            return Err(EvaluationError::InputCount {
                expected: self.inputs.len(),
                found: inputs.len(),
            }
            .into());
        }
        let mut entries = Vec::with_capacity(inputs.len());
        for (i, (&x, block)) in inputs.iter().zip(&self.inputs).enumerate() {
            graph.check(x)?;
            let nnz = graph.sparsity(x).nnz();
            if nnz != block.slots.len() {
                return Err(EvaluationError::InputLength {
                    input: i,
                    expected: block.slots.len(),
                    found: nnz,
                }
                .into());
            }
            entries.push(graph.nonzeros(x)?);
        }
        Ok(entries)
    }

    /// Jacobian of output `oind` with respect to input `iind` as one sparse
    /// matrix expression of shape `n_out_nz x n_in_nz`.
    ///
    /// `inputs` are the input matrices, one per declared input, normally the
    /// symbols the tape was built from. Positions outside the propagated
    /// sparsity pattern are structural zeros.
    pub fn jacobian_expr(
        &self,
        graph: &mut ExprGraph,
        inputs: &[ExprId],
        iind: usize,
        oind: usize,
    ) -> Result<ExprId> {
        self.check_input(iind)?;
        self.check_output(oind)?;
        let entries = self.input_entries(graph, inputs)?;
        let pattern = self.jac_sparsity(iind, oind)?;
        let n_in = self.inputs[iind].slots.len();
        let n_out = self.outputs[oind].slots.len();

        let values: Vec<ExprId> = if n_in <= n_out {
            let seeds: Vec<Seed<ExprId>> = (0..n_in)
                .map(|j| unit_seed(&self.inputs, iind, [j], ExprId::ZERO, ExprId::ONE))
                .collect();
            let res = self.forward_symbolic(graph, &entries, &seeds)?;
            pattern
                .iter()
                .map(|(r, c)| res.sensitivities[c][oind][r])
                .collect()
        } else {
            let seeds: Vec<Seed<ExprId>> = (0..n_out)
                .map(|r| unit_seed(&self.outputs, oind, [r], ExprId::ZERO, ExprId::ONE))
                .collect();
            let res = self.reverse_symbolic(graph, &entries, &seeds)?;
            pattern
                .iter()
                .map(|(r, c)| res.sensitivities[r][iind][c])
                .collect()
        };
        Ok(graph.assemble(&pattern, &values)?)
    }

    /// Hessian of the single-nonzero output `oind` with respect to input
    /// `iind`, `n_in_nz x n_in_nz`.
    ///
    /// Forward over adjoint: the symbolic gradient is built into a second
    /// tape over the same inputs and its Jacobian taken.
    pub fn hessian_expr(
        &self,
        graph: &mut ExprGraph,
        inputs: &[ExprId],
        iind: usize,
        oind: usize,
    ) -> Result<ExprId> {
        self.check_input(iind)?;
        self.check_output(oind)?;
        if self.outputs[oind].slots.len() != 1 {
            return Err(EvaluationError::NotScalar { output: oind }.into());
        }
        let entries = self.input_entries(graph, inputs)?;
        let seed = unit_seed(&self.outputs, oind, [0], ExprId::ZERO, ExprId::ONE);
        let res = self.reverse_symbolic(graph, &entries, &[seed])?;
        let grad = &res.sensitivities[0][iind];
        let g = graph.assemble(&Sparsity::column(grad.len()), grad)?;

        let grad_tape = Tape::build(graph, inputs, &[g])?;
        grad_tape.jacobian_expr(graph, inputs, iind, 0)
    }
}
