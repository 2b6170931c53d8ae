//! Reverse (adjoint) mode: weighted sums of output sensitivities.

use crate::error::EvaluationError;
use crate::float::Float;

use super::{check_seeds, unit_seed, Derivatives, Evaluator, Seed, Tape};

impl<F: Float> Evaluator<'_, F> {
    /// Propagate `seeds.len()` output adjoints back to the inputs.
    ///
    /// Each seed holds one vector per output block. The returned
    /// sensitivities hold, per direction, one vector per input block:
    /// `J^T * seed`. Inputs reached along several paths, or used twice by
    /// one instruction, receive the sum of all contributions.
    pub fn reverse_ad<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        seeds: &[Seed<F>],
    ) -> Result<Derivatives<F>, EvaluationError> {
        let tape = self.tape;
        check_seeds(&tape.outputs, seeds)?;
        self.load_inputs(inputs)?;

        let mut alg = self.algebra();
        if let Err(k) = tape.sweep_primal_partials(&mut alg, &mut self.work, &mut self.partials) {
            return Err(self.domain_error(k));
        }
        let outputs = self.read_outputs();

        let ndir = seeds.len();
        self.adjoints.clear();
        self.adjoints.resize(tape.num_slots * ndir, F::zero());
        for (d, seed) in seeds.iter().enumerate() {
            for (block, values) in tape.outputs.iter().zip(seed) {
                // Several outputs may share a slot; their seeds add up.
                for (&s, &v) in block.slots.iter().zip(values) {
                    let i = s as usize * ndir + d;
                    self.adjoints[i] = self.adjoints[i] + v;
                }
            }
        }
        tape.sweep_adjoint(&mut alg, &self.partials, &mut self.adjoints, ndir);

        let sensitivities = (0..ndir)
            .map(|d| {
                tape.inputs
                    .iter()
                    .map(|block| {
                        block
                            .slots
                            .iter()
                            .map(|&s| self.adjoints[s as usize * ndir + d])
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Ok(Derivatives {
            outputs,
            sensitivities,
        })
    }

    /// Gradient of the single-nonzero output `oind` with respect to every
    /// input block.
    pub fn gradient<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        let tape = self.tape;
        tape.check_output(oind)?;
        if tape.outputs[oind].slots.len() != 1 {
            return Err(EvaluationError::NotScalar { output: oind });
        }
        let seed = unit_seed(&tape.outputs, oind, [0], F::zero(), F::one());
        let mut res = self.reverse_ad(inputs, &[seed])?;
        Ok(res.sensitivities.pop().unwrap_or_default())
    }
}

impl Tape {
    /// One-shot [`Evaluator::reverse_ad`].
    pub fn reverse_ad<F: Float, I: AsRef<[F]>>(
        &self,
        inputs: &[I],
        seeds: &[Seed<F>],
    ) -> Result<Derivatives<F>, EvaluationError> {
        self.evaluator().reverse_ad(inputs, seeds)
    }

    /// One-shot [`Evaluator::gradient`].
    pub fn gradient<F: Float, I: AsRef<[F]>>(
        &self,
        inputs: &[I],
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        self.evaluator().gradient(inputs, oind)
    }
}
