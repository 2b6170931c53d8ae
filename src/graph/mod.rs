//! Arena expression graph with structural interning.
//!
//! Nodes live in one `Vec` and are addressed by [`ExprId`]. Constructing a
//! node whose operation and operand handles match an existing node returns
//! the existing handle, so shared subexpressions are never duplicated.
//! Symbols are the exception: every call to [`ExprGraph::symbol`] creates a
//! fresh leaf.
//!
//! Each node caches its sparsity pattern (computed once, at construction)
//! and the number of distinct parents referencing it.

mod display;
mod node;

use std::collections::HashMap;

pub use display::ExprDisplay;
pub use node::{ConcatKind, ExprId, Node};

use crate::error::GraphError;
use crate::opcode::{OpCode, ZeroRule};
use crate::sparsity::Sparsity;

struct NodeData {
    node: Node,
    sparsity: Sparsity,
    refs: u32,
}

/// Arena-based expression graph.
pub struct ExprGraph {
    nodes: Vec<NodeData>,
    intern: HashMap<Node, ExprId>,
    symbol_names: Vec<String>,
}

impl Default for ExprGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprGraph {
    /// Create a new graph pre-populated with ZERO, ONE, TWO.
    pub fn new() -> Self {
        let mut g = Self {
            nodes: Vec::new(),
            intern: HashMap::new(),
            symbol_names: Vec::new(),
        };
        let z = g.constant(0.0);
        debug_assert_eq!(z, ExprId::ZERO);
        let o = g.constant(1.0);
        debug_assert_eq!(o, ExprId::ONE);
        let t = g.constant(2.0);
        debug_assert_eq!(t, ExprId::TWO);
        g
    }

    /// Total number of nodes in the graph.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty (it never is after construction).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` was allocated by this graph.
    #[inline]
    pub fn contains(&self, id: ExprId) -> bool {
        id.index() < self.nodes.len()
    }

    pub(crate) fn check(&self, id: ExprId) -> Result<(), GraphError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode { node: id })
        }
    }

    /// Look up the node for an ExprId.
    ///
    /// Panics if `id` belongs to another graph.
    #[inline]
    pub fn node(&self, id: ExprId) -> &Node {
        &self.nodes[id.index()].node
    }

    /// Cached sparsity pattern of a node.
    #[inline]
    pub fn sparsity(&self, id: ExprId) -> &Sparsity {
        &self.nodes[id.index()].sparsity
    }

    #[inline]
    pub fn shape(&self, id: ExprId) -> (usize, usize) {
        self.sparsity(id).shape()
    }

    /// Number of distinct parent nodes referencing `id`.
    #[inline]
    pub fn ref_count(&self, id: ExprId) -> u32 {
        self.nodes[id.index()].refs
    }

    /// Ordered operand handles of `id`.
    pub fn dependencies(&self, id: ExprId) -> Vec<ExprId> {
        self.node(id).dependencies()
    }

    /// Name of a symbol node.
    pub fn symbol_name(&self, id: ExprId) -> Option<&str> {
        match self.node(id) {
            Node::Symbol(k) => Some(self.symbol_names[*k as usize].as_str()),
            _ => None,
        }
    }

    /// Value of a constant node.
    pub fn literal(&self, id: ExprId) -> Option<f64> {
        match self.node(id) {
            Node::Constant(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// Whether `id` is a constant with value `v`.
    pub fn is_literal(&self, id: ExprId, v: f64) -> bool {
        self.literal(id) == Some(v)
    }

    /// Internal: insert a node, returning its interned ExprId.
    fn insert(&mut self, node: Node, sparsity: Sparsity) -> ExprId {
        if let Some(&id) = self.intern.get(&node) {
            return id;
        }
        let id = self.push(node.clone(), sparsity);
        self.intern.insert(node, id);
        id
    }

    fn push(&mut self, node: Node, sparsity: Sparsity) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        let mut deps = node.dependencies();
        deps.sort_unstable();
        deps.dedup();
        for d in deps {
            self.nodes[d.index()].refs += 1;
        }
        self.nodes.push(NodeData {
            node,
            sparsity,
            refs: 0,
        });
        id
    }

    // ── Leaves ──

    /// Fresh symbol with the given pattern. Never interned.
    pub fn symbol(&mut self, name: impl Into<String>, sparsity: Sparsity) -> ExprId {
        let k = self.symbol_names.len() as u32;
        self.symbol_names.push(name.into());
        self.push(Node::Symbol(k), sparsity)
    }

    /// Fresh 1x1 symbol.
    pub fn scalar_symbol(&mut self, name: impl Into<String>) -> ExprId {
        self.symbol(name, Sparsity::scalar())
    }

    /// Fresh dense column-vector symbol.
    pub fn vector_symbol(&mut self, name: impl Into<String>, n: usize) -> ExprId {
        self.symbol(name, Sparsity::column(n))
    }

    /// Fresh dense matrix symbol.
    pub fn matrix_symbol(&mut self, name: impl Into<String>, nrow: usize, ncol: usize) -> ExprId {
        self.symbol(name, Sparsity::dense(nrow, ncol))
    }

    /// 1x1 literal.
    pub fn constant(&mut self, v: f64) -> ExprId {
        self.insert(Node::constant(v), Sparsity::scalar())
    }

    /// Structurally empty `nrow x ncol` matrix.
    pub fn zeros(&mut self, nrow: usize, ncol: usize) -> ExprId {
        self.insert(Node::Zeros(nrow, ncol), Sparsity::empty(nrow, ncol))
    }

    // ── Elementwise ──

    /// Elementwise unary operation.
    ///
    /// Panics if `op` is not unary or `a` belongs to another graph.
    pub fn unary(&mut self, op: OpCode, a: ExprId) -> ExprId {
        assert!(op.is_unary(), "{op:?} is not a unary operation");
        assert!(self.contains(a), "{a:?} is not a node of this graph");
        let sa = self.sparsity(a);
        let sparsity = if op.zero_rule() == ZeroRule::Preserves {
            sa.clone()
        } else {
            Sparsity::dense(sa.nrow(), sa.ncol())
        };
        self.insert(Node::Unary(op, a), sparsity)
    }

    /// Elementwise binary operation. A 1x1 operand broadcasts against the other.
    ///
    /// Panics if `op` is not binary.
    pub fn binary(&mut self, op: OpCode, a: ExprId, b: ExprId) -> Result<ExprId, GraphError> {
        assert!(op.is_binary(), "{op:?} is not a binary operation");
        self.check(a)?;
        self.check(b)?;
        let (a, b) = if op.is_commutative() && b < a { (b, a) } else { (a, b) };

        let sa = self.sparsity(a);
        let sb = self.sparsity(b);
        let shape = if sa.shape() == sb.shape() {
            sa.shape()
        } else if sa.is_scalar() {
            sb.shape()
        } else if sb.is_scalar() {
            sa.shape()
        } else {
            return Err(GraphError::ShapeMismatch {
                op,
                lhs: sa.shape(),
                rhs: sb.shape(),
            });
        };
        let sparsity = broadcast(sa, shape).combine(&broadcast(sb, shape), op.zero_rule());
        Ok(self.insert(Node::Binary(op, a, b), sparsity))
    }

    /// Binary operation on two operands already known to be 1x1.
    pub(crate) fn scalar_binary(&mut self, op: OpCode, a: ExprId, b: ExprId) -> ExprId {
        debug_assert!(self.sparsity(a).is_scalar() && self.sparsity(b).is_scalar());
        let (a, b) = if op.is_commutative() && b < a { (b, a) } else { (a, b) };
        let sparsity = self.sparsity(a).combine(self.sparsity(b), op.zero_rule());
        self.insert(Node::Binary(op, a, b), sparsity)
    }

    pub fn add(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, GraphError> {
        self.binary(OpCode::Add, a, b)
    }

    pub fn sub(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, GraphError> {
        self.binary(OpCode::Sub, a, b)
    }

    pub fn mul(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, GraphError> {
        self.binary(OpCode::Mul, a, b)
    }

    pub fn div(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, GraphError> {
        self.binary(OpCode::Div, a, b)
    }

    pub fn pow(&mut self, a: ExprId, b: ExprId) -> Result<ExprId, GraphError> {
        self.binary(OpCode::Pow, a, b)
    }

    pub fn neg(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Neg, a)
    }

    pub fn sq(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Sq, a)
    }

    pub fn sqrt(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Sqrt, a)
    }

    pub fn exp(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Exp, a)
    }

    pub fn ln(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Ln, a)
    }

    pub fn sin(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Sin, a)
    }

    pub fn cos(&mut self, a: ExprId) -> ExprId {
        self.unary(OpCode::Cos, a)
    }

    // ── Structural ──

    /// Concatenate `parts` in the given direction.
    ///
    /// A single part is returned unchanged; an empty list yields a 0x0 matrix.
    pub fn concat(&mut self, kind: ConcatKind, parts: &[ExprId]) -> Result<ExprId, GraphError> {
        for &p in parts {
            self.check(p)?;
        }
        match parts {
            [] => return Ok(self.zeros(0, 0)),
            [single] => return Ok(*single),
            _ => {}
        }
        let patterns: Vec<&Sparsity> = parts.iter().map(|&p| self.sparsity(p)).collect();
        let (sparsity, _) = match kind {
            ConcatKind::Horizontal => Sparsity::horzcat(&patterns)?,
            ConcatKind::Vertical => Sparsity::vertcat(&patterns)?,
            ConcatKind::Diagonal => Sparsity::diagcat(&patterns),
        };
        Ok(self.insert(Node::Concat(kind, parts.to_vec()), sparsity))
    }

    pub fn horzcat(&mut self, parts: &[ExprId]) -> Result<ExprId, GraphError> {
        self.concat(ConcatKind::Horizontal, parts)
    }

    pub fn vertcat(&mut self, parts: &[ExprId]) -> Result<ExprId, GraphError> {
        self.concat(ConcatKind::Vertical, parts)
    }

    pub fn diagcat(&mut self, parts: &[ExprId]) -> Result<ExprId, GraphError> {
        self.concat(ConcatKind::Diagonal, parts)
    }

    /// Transpose. The transpose of a transpose is its operand and a 1x1
    /// operand is returned as is.
    ///
    /// Panics if `a` belongs to another graph.
    pub fn transpose(&mut self, a: ExprId) -> ExprId {
        assert!(self.contains(a), "{a:?} is not a node of this graph");
        if let Node::Transpose(inner) = self.node(a) {
            return *inner;
        }
        if self.sparsity(a).is_scalar() {
            return a;
        }
        let (sparsity, _) = self.sparsity(a).transpose();
        self.insert(Node::Transpose(a), sparsity)
    }

    /// Stored entry `k` of `a` (in nonzero order) as a 1x1 expression.
    pub fn nonzero(&mut self, a: ExprId, k: usize) -> Result<ExprId, GraphError> {
        self.check(a)?;
        let nnz = self.sparsity(a).nnz();
        if k >= nnz {
            return Err(GraphError::NonzeroOutOfRange {
                node: a,
                index: k,
                nnz,
            });
        }
        if nnz == 1 && self.sparsity(a).is_scalar() {
            return Ok(a);
        }
        Ok(self.insert(Node::GetNonzero(a, k), Sparsity::scalar()))
    }

    /// Every stored entry of `a` as a 1x1 expression, in nonzero order.
    pub fn nonzeros(&mut self, a: ExprId) -> Result<Vec<ExprId>, GraphError> {
        let nnz = self.sparsity(a).nnz();
        (0..nnz).map(|k| self.nonzero(a, k)).collect()
    }

    /// Matrix with pattern `sparsity` whose stored entries are the 1x1
    /// expressions `entries` (one per nonzero, in nonzero order).
    ///
    /// Built from concatenations, so positions outside `sparsity` stay
    /// structurally zero.
    pub fn assemble(
        &mut self,
        sparsity: &Sparsity,
        entries: &[ExprId],
    ) -> Result<ExprId, GraphError> {
        if entries.len() != sparsity.nnz() {
            return Err(GraphError::InvalidSparsity(format!(
                "{} entries for a pattern with {} nonzeros",
                entries.len(),
                sparsity.nnz()
            )));
        }
        let (nrow, ncol) = sparsity.shape();
        let mut columns = Vec::with_capacity(ncol);
        for c in 0..ncol {
            let mut cells = Vec::with_capacity(nrow);
            for r in 0..nrow {
                let cell = match sparsity.get_nz(r, c) {
                    Some(k) => entries[k],
                    None => self.zeros(1, 1),
                };
                cells.push(cell);
            }
            let column = if nrow == 0 {
                self.zeros(0, 1)
            } else {
                self.vertcat(&cells)?
            };
            columns.push(column);
        }
        if ncol == 0 {
            return Ok(self.zeros(nrow, 0));
        }
        self.horzcat(&columns)
    }

    // ── Equality ──

    /// Depth-bounded structural equality.
    ///
    /// Identical handles are equal. Otherwise the operation tags must match
    /// and operands are compared recursively with `depth - 1`; once `depth`
    /// reaches zero, distinct handles compare unequal. Commutative operands
    /// are also tried in swapped order.
    pub fn is_equal(&self, a: ExprId, b: ExprId, depth: usize) -> bool {
        if a == b {
            return true;
        }
        if depth == 0 || !self.contains(a) || !self.contains(b) {
            return false;
        }
        let (na, nb) = (self.node(a), self.node(b));
        if !na.same_operation(nb) {
            return false;
        }
        if matches!(na, Node::Symbol(_)) {
            return false;
        }
        if self.shape(a) != self.shape(b) {
            return false;
        }
        let da = na.dependencies();
        let db = nb.dependencies();
        let pairwise = |x: &[ExprId], y: &[ExprId]| {
            x.iter()
                .zip(y)
                .all(|(&p, &q)| self.is_equal(p, q, depth - 1))
        };
        if pairwise(&da, &db) {
            return true;
        }
        match (na, nb) {
            (Node::Binary(op, ..), Node::Binary(..)) if op.is_commutative() => {
                self.is_equal(da[0], db[1], depth - 1) && self.is_equal(da[1], db[0], depth - 1)
            }
            _ => false,
        }
    }
}

/// Pattern of `s` viewed at `shape`: a 1x1 operand covers every position
/// when it is stored and none otherwise.
fn broadcast(s: &Sparsity, shape: (usize, usize)) -> Sparsity {
    if s.shape() == shape {
        s.clone()
    } else if s.nnz() == 1 {
        Sparsity::dense(shape.0, shape.1)
    } else {
        Sparsity::empty(shape.0, shape.1)
    }
}
