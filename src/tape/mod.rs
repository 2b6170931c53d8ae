//! The instruction tape and everything that executes it.
//!
//! A [`Tape`] is an immutable, topologically ordered list of scalar
//! [`Instruction`]s over a flat working array of slots. Declared inputs
//! occupy slots `0..n_in` (in declaration order, nonzeros within a block in
//! nonzero order) and are not instructions; outputs are slot lists.
//!
//! The submodules add `impl Tape` / `impl Evaluator` blocks:
//!
//! - `interpreter`: the generic primal, tangent and adjoint sweeps.
//! - `eval`: numeric evaluation sessions.
//! - `forward`, `reverse`: directional and adjoint derivatives.
//! - `jacobian`: dense and coloring-compressed Jacobians.
//! - `symbolic`: symbolic sweeps, Jacobian and Hessian expressions.
//! - `sparse`: dependency propagation over bit masks.
//! - `parallel`: rayon batch evaluation (`parallel` feature).
//! - `serde_support`: serialization (`serde` feature).

mod eval;
mod forward;
mod interpreter;
mod jacobian;
mod reverse;
mod sparse;
mod symbolic;

#[cfg(feature = "parallel")]
mod parallel;
#[cfg(feature = "serde")]
mod serde_support;

use std::fmt;

pub use eval::Evaluator;
#[cfg(feature = "parallel")]
pub(crate) use sparse::BATCH_BITS;
pub use sparse::Direction;

use crate::error::GraphError;
use crate::opcode::{OpCode, UNUSED};
use crate::sparsity::Sparsity;

/// One scalar operation: `slot[out] = op(slot[args[0]], slot[args[1]])`.
///
/// Unary instructions have `args[1] == UNUSED`; constants have both
/// arguments `UNUSED` and carry their value in `literal`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    pub op: OpCode,
    pub out: u32,
    pub args: [u32; 2],
    pub literal: f64,
}

impl Instruction {
    /// Operand slots actually read.
    #[inline]
    pub fn operands(&self) -> impl Iterator<Item = u32> + '_ {
        self.args.iter().take(self.op.arity()).copied()
    }
}

/// A declared input or output: its pattern and the slot of each nonzero.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IoBlock {
    pub name: String,
    pub sparsity: Sparsity,
    pub slots: Vec<u32>,
}

/// Immutable instruction tape produced by the [`TapeBuilder`](crate::TapeBuilder).
#[derive(Clone, Debug, PartialEq)]
pub struct Tape {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) num_slots: usize,
    pub(crate) inputs: Vec<IoBlock>,
    pub(crate) outputs: Vec<IoBlock>,
}

impl Tape {
    /// Assemble and validate a tape from its parts.
    pub fn from_parts(
        instructions: Vec<Instruction>,
        num_slots: usize,
        inputs: Vec<IoBlock>,
        outputs: Vec<IoBlock>,
    ) -> Result<Self, GraphError> {
        let tape = Self {
            instructions,
            num_slots,
            inputs,
            outputs,
        };
        tape.validate()?;
        Ok(tape)
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn num_instructions(&self) -> usize {
        self.instructions.len()
    }

    /// Length of the working array.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Slots beyond those holding input nonzeros.
    #[inline]
    pub fn num_temporaries(&self) -> usize {
        self.num_slots - self.num_input_nonzeros()
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn inputs(&self) -> &[IoBlock] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[IoBlock] {
        &self.outputs
    }

    pub fn input_sparsity(&self, i: usize) -> &Sparsity {
        &self.inputs[i].sparsity
    }

    pub fn output_sparsity(&self, o: usize) -> &Sparsity {
        &self.outputs[o].sparsity
    }

    /// Total nonzeros over all input blocks.
    pub fn num_input_nonzeros(&self) -> usize {
        self.inputs.iter().map(|b| b.slots.len()).sum()
    }

    /// Total nonzeros over all output blocks.
    pub fn num_output_nonzeros(&self) -> usize {
        self.outputs.iter().map(|b| b.slots.len()).sum()
    }

    /// Number of `Const` instructions.
    pub fn num_constants(&self) -> usize {
        self.instructions
            .iter()
            .filter(|ins| ins.op == OpCode::Const)
            .count()
    }

    /// Count of instructions with the given opcode.
    pub fn count_op(&self, op: OpCode) -> usize {
        self.instructions.iter().filter(|ins| ins.op == op).count()
    }

    /// True if no instruction has a kink or jump (abs, sign, rounding, fmin, fmax).
    pub fn is_smooth(&self) -> bool {
        !self.instructions.iter().any(|ins| ins.op.is_nonsmooth())
    }

    /// Check SSA ordering: every operand slot is written (by an input or an
    /// earlier instruction) before it is read, and every slot is in range.
    pub fn validate(&self) -> Result<(), GraphError> {
        let invalid = |msg: String| Err(GraphError::InvalidTape(msg));
        let mut written = vec![false; self.num_slots];
        let mut next_input = 0usize;
        for (i, block) in self.inputs.iter().enumerate() {
            if block.slots.len() != block.sparsity.nnz() {
                return invalid(format!(
                    "input {i} has {} slots for {} nonzeros",
                    block.slots.len(),
                    block.sparsity.nnz()
                ));
            }
            for &s in &block.slots {
                if s as usize != next_input || next_input >= self.num_slots {
                    return invalid(format!("input {i} slots are not contiguous from 0"));
                }
                written[next_input] = true;
                next_input += 1;
            }
        }
        for (k, ins) in self.instructions.iter().enumerate() {
            let expected_unused = 2 - ins.op.arity();
            if ins.args[2 - expected_unused..].iter().any(|&a| a != UNUSED) {
                return invalid(format!("instruction {k} has extra operands"));
            }
            for a in ins.operands() {
                if a as usize >= self.num_slots || !written[a as usize] {
                    return invalid(format!("instruction {k} reads unwritten slot {a}"));
                }
            }
            if ins.out as usize >= self.num_slots {
                return invalid(format!("instruction {k} writes slot {} out of range", ins.out));
            }
            written[ins.out as usize] = true;
        }
        for (o, block) in self.outputs.iter().enumerate() {
            if block.slots.len() != block.sparsity.nnz() {
                return invalid(format!(
                    "output {o} has {} slots for {} nonzeros",
                    block.slots.len(),
                    block.sparsity.nnz()
                ));
            }
            let unwritten = |&s: &u32| s as usize >= self.num_slots || !written[s as usize];
            if block.slots.iter().any(unwritten) {
                return invalid(format!("output {o} reads an unwritten slot"));
            }
        }
        Ok(())
    }

    pub(crate) fn check_input(&self, i: usize) -> Result<(), crate::error::EvaluationError> {
        if i < self.inputs.len() {
            Ok(())
        } else {
            Err(crate::error::EvaluationError::IndexOutOfRange {
                kind: "input",
                index: i,
                len: self.inputs.len(),
            })
        }
    }

    pub(crate) fn check_output(&self, o: usize) -> Result<(), crate::error::EvaluationError> {
        if o < self.outputs.len() {
            Ok(())
        } else {
            Err(crate::error::EvaluationError::IndexOutOfRange {
                kind: "output",
                index: o,
                len: self.outputs.len(),
            })
        }
    }
}

/// Algorithm listing: one line per instruction, then the output map.
impl fmt::Display for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.inputs.iter().enumerate() {
            write!(f, "input[{i}] {} ({}):", block.name, block.sparsity)?;
            for s in &block.slots {
                write!(f, " @{s}")?;
            }
            writeln!(f)?;
        }
        for ins in &self.instructions {
            let [a, b] = ins.args;
            match (ins.op, ins.op.infix()) {
                (OpCode::Const, _) => writeln!(f, "@{} = {}", ins.out, ins.literal)?,
                (_, Some(sym)) => writeln!(f, "@{} = (@{a} {sym} @{b})", ins.out)?,
                (op, None) if op.is_binary() => {
                    writeln!(f, "@{} = {}(@{a}, @{b})", ins.out, op.name())?
                }
                (op, None) => writeln!(f, "@{} = {}(@{a})", ins.out, op.name())?,
            }
        }
        for (o, block) in self.outputs.iter().enumerate() {
            write!(f, "output[{o}] {} ({}):", block.name, block.sparsity)?;
            for s in &block.slots {
                write!(f, " @{s}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Seed or sensitivity aligned with declared blocks: one vector of nonzeros per block.
pub type Seed<T> = Vec<Vec<T>>;

/// Outputs of a derivative sweep plus one sensitivity per seed direction.
///
/// Forward sensitivities align with the output blocks, reverse sensitivities
/// with the input blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct Derivatives<T> {
    pub outputs: Vec<Vec<T>>,
    pub sensitivities: Vec<Seed<T>>,
}

/// Check that every direction has one correctly sized vector per block.
pub(crate) fn check_seeds<T>(
    blocks: &[IoBlock],
    seeds: &[Seed<T>],
) -> Result<(), crate::error::EvaluationError> {
    for (d, seed) in seeds.iter().enumerate() {
        if seed.len() != blocks.len() {
            return Err(crate::error::EvaluationError::InputCount {
                expected: blocks.len(),
                found: seed.len(),
            });
        }
        for (b, (block, values)) in blocks.iter().zip(seed).enumerate() {
            if values.len() != block.slots.len() {
                return Err(crate::error::EvaluationError::SeedShape {
                    direction: d,
                    block: b,
                    expected: block.slots.len(),
                    found: values.len(),
                });
            }
        }
    }
    Ok(())
}

/// Seed that is zero everywhere except nonzeros `ks` of block `block`.
pub(crate) fn unit_seed<T: Clone>(
    blocks: &[IoBlock],
    block: usize,
    ks: impl IntoIterator<Item = usize>,
    zero: T,
    one: T,
) -> Seed<T> {
    let mut seed: Seed<T> = blocks
        .iter()
        .map(|b| vec![zero.clone(); b.slots.len()])
        .collect();
    for k in ks {
        seed[block][k] = one.clone();
    }
    seed
}
