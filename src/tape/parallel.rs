use rayon::prelude::*;

use crate::error::EvaluationError;
use crate::float::Float;

use super::Tape;

impl Tape {
    /// Evaluate many input points concurrently.
    ///
    /// Each rayon worker owns one [`Evaluator`](super::Evaluator); the tape
    /// itself is shared read-only. Results are in input order.
    pub fn evaluate_batch<F: Float, I: AsRef<[F]> + Sync>(
        &self,
        points: &[Vec<I>],
    ) -> Result<Vec<Vec<Vec<F>>>, EvaluationError> {
        points
            .par_iter()
            .map_init(|| self.evaluator::<F>(), |ev, inputs| ev.evaluate(inputs))
            .collect()
    }

    /// Gradient of every single-nonzero output in `oinds`, one reverse sweep
    /// per output, in parallel.
    pub fn gradients_par<F: Float, I: AsRef<[F]> + Sync>(
        &self,
        inputs: &[I],
        oinds: &[usize],
    ) -> Result<Vec<Vec<Vec<F>>>, EvaluationError> {
        oinds
            .par_iter()
            .map_init(|| self.evaluator::<F>(), |ev, &o| ev.gradient(inputs, o))
            .collect()
    }

    /// Dense Jacobian with rows computed concurrently: one reverse sweep per
    /// output nonzero.
    pub fn jacobian_par<F: Float, I: AsRef<[F]> + Sync>(
        &self,
        inputs: &[I],
        iind: usize,
        oind: usize,
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        self.check_input(iind)?;
        self.check_output(oind)?;
        (0..self.outputs[oind].slots.len())
            .into_par_iter()
            .map_init(
                || self.evaluator::<F>(),
                |ev, r| {
                    let seed = super::unit_seed(&self.outputs, oind, [r], F::zero(), F::one());
                    let mut res = ev.reverse_ad(inputs, &[seed])?;
                    Ok(std::mem::take(&mut res.sensitivities[0][iind]))
                },
            )
            .collect()
    }
}
