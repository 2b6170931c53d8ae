//! Numeric evaluation sessions.

use crate::algebra::Real;
use crate::error::EvaluationError;
use crate::float::Float;
use crate::options::EvalOptions;

use super::Tape;

/// Working storage for evaluating one tape.
///
/// The tape is shared read-only; every session owns its arrays, so
/// concurrent evaluations of one tape each use their own `Evaluator`.
/// Buffers grow on first use and are reused across calls.
pub struct Evaluator<'t, F: Float> {
    pub(crate) tape: &'t Tape,
    pub(crate) options: EvalOptions,
    pub(crate) work: Vec<F>,
    pub(crate) tangents: Vec<F>,
    pub(crate) partials: Vec<(F, F)>,
    pub(crate) adjoints: Vec<F>,
}

impl Tape {
    /// New evaluation session with default options.
    pub fn evaluator<F: Float>(&self) -> Evaluator<'_, F> {
        self.evaluator_with(EvalOptions::default())
    }

    pub fn evaluator_with<F: Float>(&self, options: EvalOptions) -> Evaluator<'_, F> {
        Evaluator {
            tape: self,
            options,
            work: vec![F::zero(); self.num_slots],
            tangents: Vec::new(),
            partials: Vec::new(),
            adjoints: Vec::new(),
        }
    }

    /// Evaluate once in a throwaway session.
    ///
    /// `inputs[i]` holds the nonzeros of input block `i`; the result holds
    /// the nonzeros of each output block.
    pub fn evaluate<F: Float, I: AsRef<[F]>>(
        &self,
        inputs: &[I],
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        self.evaluator().evaluate(inputs)
    }
}

impl<'t, F: Float> Evaluator<'t, F> {
    pub fn tape(&self) -> &'t Tape {
        self.tape
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub(crate) fn algebra(&self) -> Real<F> {
        Real::new(self.options.domain_policy)
    }

    /// Check block counts and lengths, then copy the inputs into their slots.
    pub(crate) fn load_inputs<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
    ) -> Result<(), EvaluationError> {
        let tape = self.tape;
        if inputs.len() != tape.inputs.len() {
            return Err(EvaluationError::InputCount {
                expected: tape.inputs.len(),
                found: inputs.len(),
            });
        }
        self.work.resize(tape.num_slots, F::zero());
        for (i, (block, values)) in tape.inputs.iter().zip(inputs).enumerate() {
            let values = values.as_ref();
            if values.len() != block.slots.len() {
                return Err(EvaluationError::InputLength {
                    input: i,
                    expected: block.slots.len(),
                    found: values.len(),
                });
            }
            for (&s, &v) in block.slots.iter().zip(values) {
                self.work[s as usize] = v;
            }
        }
        Ok(())
    }

    pub(crate) fn domain_error(&self, instruction: usize) -> EvaluationError {
        EvaluationError::Domain {
            instruction,
            op: self.tape.instructions[instruction].op,
        }
    }

    /// Output nonzeros as currently held in the working array.
    pub(crate) fn read_outputs(&self) -> Vec<Vec<F>> {
        self.tape
            .outputs
            .iter()
            .map(|block| block.slots.iter().map(|&s| self.work[s as usize]).collect())
            .collect()
    }

    /// Run the primal sweep and return the output nonzeros.
    ///
    /// Deterministic: the same inputs give bit-identical outputs on every call.
    pub fn evaluate<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
    ) -> Result<Vec<Vec<F>>, EvaluationError> {
        self.load_inputs(inputs)?;
        let mut alg = self.algebra();
        if let Err(k) = self.tape.sweep_primal(&mut alg, &mut self.work) {
            return Err(self.domain_error(k));
        }
        Ok(self.read_outputs())
    }

    /// Like [`evaluate`](Self::evaluate) but refills caller-provided output
    /// buffers, one per output block.
    pub fn evaluate_into<I: AsRef<[F]>>(
        &mut self,
        inputs: &[I],
        outputs: &mut [Vec<F>],
    ) -> Result<(), EvaluationError> {
        if outputs.len() != self.tape.outputs.len() {
            return Err(EvaluationError::OutputCount {
                expected: self.tape.outputs.len(),
                found: outputs.len(),
            });
        }
        self.load_inputs(inputs)?;
        let mut alg = self.algebra();
        if let Err(k) = self.tape.sweep_primal(&mut alg, &mut self.work) {
            return Err(self.domain_error(k));
        }
        for (block, out) in self.tape.outputs.iter().zip(outputs.iter_mut()) {
            out.clear();
            out.extend(block.slots.iter().map(|&s| self.work[s as usize]));
        }
        Ok(())
    }
}
