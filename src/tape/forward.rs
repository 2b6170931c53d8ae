//! Forward (tangent) mode: directional derivatives of every output.

use crate::error::EvaluationError;
use crate::float::Float;

use super::{check_seeds, Derivatives, Evaluator, Seed, Tape};

impl<F: Float> Evaluator<'_, F> {
    /// Propagate `seeds.len()` input directions in a single sweep.
    ///
    /// Each seed holds one vector per input block, in nonzero order. The
    /// returned sensitivities hold, per direction, one vector per output
    /// block: `J * seed`.
    pub fn forward_ad<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        seeds: &[Seed<F>],
    ) -> Result<Derivatives<F>, EvaluationError> {
        let tape = self.tape;
        check_seeds(&tape.inputs, seeds)?;
        self.load_inputs(inputs)?;

        let ndir = seeds.len();
        self.tangents.clear();
        self.tangents.resize(tape.num_slots * ndir, F::zero());
        for (d, seed) in seeds.iter().enumerate() {
            for (block, values) in tape.inputs.iter().zip(seed) {
                for (&s, &v) in block.slots.iter().zip(values) {
                    self.tangents[s as usize * ndir + d] = v;
                }
            }
        }

        let mut alg = self.algebra();
        if let Err(k) = tape.sweep_tangent(&mut alg, &mut self.work, &mut self.tangents, ndir) {
            return Err(self.domain_error(k));
        }

        let sensitivities = (0..ndir)
            .map(|d| {
                tape.outputs
                    .iter()
                    .map(|block| {
                        block
                            .slots
                            .iter()
                            .map(|&s| self.tangents[s as usize * ndir + d])
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Ok(Derivatives {
            outputs: self.read_outputs(),
            sensitivities,
        })
    }
}

impl Tape {
    /// One-shot [`Evaluator::forward_ad`].
    pub fn forward_ad<F: Float, I: AsRef<[F]>>(
        &self,
        inputs: &[I],
        seeds: &[Seed<F>],
    ) -> Result<Derivatives<F>, EvaluationError> {
        self.evaluator().forward_ad(inputs, seeds)
    }
}
