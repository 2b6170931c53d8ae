//! Expression graphs compiled to scalar instruction tapes.
//!
//! Build matrix-valued expressions in an [`ExprGraph`], lower them once
//! with a [`TapeBuilder`], then reuse the resulting [`Tape`] for numeric
//! evaluation, forward and reverse AD, symbolic differentiation, Jacobian
//! sparsity propagation and C code generation.
//!
//! ```
//! use tapegraph::{ExprGraph, Tape};
//!
//! let mut g = ExprGraph::new();
//! let a = g.scalar_symbol("a");
//! let b = g.scalar_symbol("b");
//! let out = g.add(a, b).unwrap();
//!
//! let tape = Tape::build(&g, &[a, b], &[out]).unwrap();
//! let y = tape.evaluate(&[vec![2.0], vec![3.0]]).unwrap();
//! assert_eq!(y, vec![vec![5.0]]);
//! ```

pub mod algebra;
pub mod backend;
pub mod builder;
pub mod codegen;
pub mod error;
pub mod float;
pub mod graph;
pub mod opcode;
pub mod options;
pub mod sparsity;
pub mod tape;

#[cfg(feature = "gpu-wgpu")]
pub mod gpu;

pub use backend::{backend_for, Sequential, SparsityBackend};
pub use builder::TapeBuilder;
pub use codegen::{CodegenOptions, Dialect, GeneratedCode};
pub use error::{Error, EvaluationError, GraphError, Result, UnsupportedOperationError};
pub use float::Float;
pub use graph::{ConcatKind, ExprGraph, ExprId, Node};
pub use opcode::OpCode;
pub use options::{BackendKind, BuildOptions, DomainPolicy, EvalOptions, SparsityOptions};
pub use sparsity::Sparsity;
pub use tape::{Derivatives, Direction, Evaluator, Instruction, IoBlock, Seed, Tape};

#[cfg(feature = "parallel")]
pub use backend::Parallel;
#[cfg(feature = "gpu-wgpu")]
pub use gpu::WgpuContext;
