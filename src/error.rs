//! Error types for tapegraph.

use thiserror::Error;

use crate::codegen::Dialect;
use crate::graph::{ConcatKind, ExprId};
use crate::opcode::OpCode;

/// Graph construction or linearization failure.
///
/// Fatal for the call that raised it; the graph itself stays valid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The traversal reached a node that is already on the traversal stack.
    #[error("cycle detected at node {node}")]
    Cycle { node: ExprId },

    /// A handle that was not allocated by this graph.
    #[error("node {node} does not belong to this graph")]
    UnknownNode { node: ExprId },

    /// An output depends on a symbol that is not among the declared inputs.
    #[error("output depends on undeclared symbol `{name}` ({node})")]
    FreeSymbol { node: ExprId, name: String },

    /// A declared input is not a leaf symbol.
    #[error("declared input {node} is not a symbol")]
    NotSymbol { node: ExprId },

    /// The same symbol was declared as an input twice.
    #[error("symbol {node} declared as input more than once")]
    DuplicateInput { node: ExprId },

    /// Binary operands with incompatible shapes (and neither is 1x1).
    #[error("shape mismatch in {op:?}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: OpCode,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },

    /// Concatenation parts disagree on the shared dimension.
    #[error("{kind} expects dimension {expected}, part has {found}")]
    ConcatMismatch {
        kind: ConcatKind,
        expected: usize,
        found: usize,
    },

    /// `GetNonzero` index past the operand's stored entries.
    #[error("nonzero index {index} out of range for {node} with {nnz} entries")]
    NonzeroOutOfRange { node: ExprId, index: usize, nnz: usize },

    /// A sparsity pattern that is not sorted, not in range, or inconsistent.
    #[error("invalid sparsity pattern: {0}")]
    InvalidSparsity(String),

    /// A tape whose instructions read slots before they are written.
    #[error("invalid tape: {0}")]
    InvalidTape(String),
}

/// Failure while executing a tape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// Wrong number of input (or seed) blocks.
    #[error("expected {expected} input blocks, got {found}")]
    InputCount { expected: usize, found: usize },

    /// Wrong number of caller-provided output buffers.
    #[error("expected {expected} output buffers, got {found}")]
    OutputCount { expected: usize, found: usize },

    /// An input block with the wrong number of nonzeros.
    #[error("input {input} expects {expected} nonzeros, got {found}")]
    InputLength {
        input: usize,
        expected: usize,
        found: usize,
    },

    /// A seed block with the wrong number of entries.
    #[error("seed {direction} block {block} expects {expected} entries, got {found}")]
    SeedShape {
        direction: usize,
        block: usize,
        expected: usize,
        found: usize,
    },

    /// An input or output index past the declared count.
    #[error("{kind} index {index} out of range ({len} declared)")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// Non-finite result from finite operands under [`DomainPolicy::Reject`](crate::options::DomainPolicy::Reject).
    #[error("domain error in instruction {instruction} ({op:?})")]
    Domain { instruction: usize, op: OpCode },

    /// Hessians are only defined for outputs with a single nonzero.
    #[error("output {output} is not scalar")]
    NotScalar { output: usize },
}

/// Code generation hit an operation with no textual rule in the chosen dialect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {dialect} emission rule for {op:?}")]
pub struct UnsupportedOperationError {
    pub op: OpCode,
    pub dialect: Dialect,
}

/// Umbrella error for fallible tapegraph calls.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedOperationError),

    /// Requested a backend whose cargo feature is disabled.
    #[error("backend `{0}` is not available in this build")]
    BackendUnavailable(&'static str),

    #[cfg(feature = "gpu-wgpu")]
    #[error(transparent)]
    Gpu(#[from] crate::gpu::GpuError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
