//! Expression node types and the `ExprId` handle.

use std::fmt;

use crate::opcode::OpCode;

/// Handle into an [`ExprGraph`](super::ExprGraph). Lightweight (4 bytes), Copy.
///
/// A node can only reference handles allocated before it, so every graph is
/// acyclic by construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExprId(pub(crate) u32);

/// Well-known node indices, pre-populated in every graph.
impl ExprId {
    /// The constant 0.0 (index 0).
    pub const ZERO: Self = Self(0);
    /// The constant 1.0 (index 1).
    pub const ONE: Self = Self(1);
    /// The constant 2.0 (index 2).
    pub const TWO: Self = Self(2);

    /// The raw index of this expression in the graph.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Direction of a concatenation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConcatKind {
    Horizontal,
    Vertical,
    Diagonal,
}

impl fmt::Display for ConcatKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ConcatKind::Horizontal => "horzcat",
            ConcatKind::Vertical => "vertcat",
            ConcatKind::Diagonal => "diagcat",
        })
    }
}

/// A node in the expression graph.
///
/// Scalar operations carry an [`OpCode`]; structural operations rearrange
/// stored entries and never compute anything.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    /// Leaf variable; the payload indexes the graph's symbol table.
    Symbol(u32),
    /// 1x1 literal stored as `f64` bits.
    Constant(u64),
    /// Matrix with no stored entries.
    Zeros(usize, usize),
    /// Elementwise unary operation.
    Unary(OpCode, ExprId),
    /// Elementwise binary operation; a 1x1 operand broadcasts.
    Binary(OpCode, ExprId, ExprId),
    /// Concatenation of two or more parts.
    Concat(ConcatKind, Vec<ExprId>),
    Transpose(ExprId),
    /// One stored entry of the operand, as a 1x1 expression.
    GetNonzero(ExprId, usize),
}

impl Node {
    /// Literal node for `v`.
    #[inline]
    pub fn constant(v: f64) -> Self {
        Node::Constant(v.to_bits())
    }

    /// Ordered operand handles.
    pub fn dependencies(&self) -> Vec<ExprId> {
        match self {
            Node::Symbol(_) | Node::Constant(_) | Node::Zeros(..) => Vec::new(),
            Node::Unary(_, a) | Node::Transpose(a) | Node::GetNonzero(a, _) => vec![*a],
            Node::Binary(_, a, b) => vec![*a, *b],
            Node::Concat(_, parts) => parts.clone(),
        }
    }

    /// Whether two nodes have the same operation tag, ignoring operands.
    pub(crate) fn same_operation(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Symbol(a), Node::Symbol(b)) => a == b,
            (Node::Constant(a), Node::Constant(b)) => a == b,
            (Node::Zeros(r1, c1), Node::Zeros(r2, c2)) => r1 == r2 && c1 == c2,
            (Node::Unary(o1, _), Node::Unary(o2, _)) => o1 == o2,
            (Node::Binary(o1, ..), Node::Binary(o2, ..)) => o1 == o2,
            (Node::Concat(k1, p1), Node::Concat(k2, p2)) => k1 == k2 && p1.len() == p2.len(),
            (Node::Transpose(_), Node::Transpose(_)) => true,
            (Node::GetNonzero(_, k1), Node::GetNonzero(_, k2)) => k1 == k2,
            _ => false,
        }
    }
}
