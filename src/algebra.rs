//! Element algebras for the tape interpreter.
//!
//! Every sweep in [`crate::tape`] is written once against [`Algebra`]; the
//! element type decides what a sweep computes:
//!
//! - [`Real`]: numeric values, derivatives and Jacobians over any [`Float`].
//! - [`Bits`]: `u64` dependency masks, where every operation ORs its operands.
//! - [`Symbolic`]: scalar [`ExprId`]s in an [`ExprGraph`], yielding new,
//!   re-differentiable expressions.

use std::marker::PhantomData;

use crate::float::Float;
use crate::graph::{ExprGraph, ExprId};
use crate::opcode::{self, OpCode};
use crate::options::DomainPolicy;

/// Element type plus the per-operation combinators a sweep needs.
pub trait Algebra {
    type Elem: Clone;

    /// Additive identity, also used for the missing operand of unary ops.
    fn zero(&mut self) -> Self::Elem;

    /// Value of a [`OpCode::Const`] instruction.
    fn constant(&mut self, value: f64) -> Self::Elem;

    /// Apply `op`. For unary ops `b` is [`Algebra::zero`].
    fn eval(&mut self, op: OpCode, a: &Self::Elem, b: &Self::Elem) -> Self::Elem;

    /// Local partials `(∂r/∂a, ∂r/∂b)` given operands and result.
    fn partials(
        &mut self,
        op: OpCode,
        a: &Self::Elem,
        b: &Self::Elem,
        r: &Self::Elem,
    ) -> (Self::Elem, Self::Elem);

    fn add(&mut self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem;

    fn mul(&mut self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem;

    /// Sweeps skip work for elements known to be zero.
    fn is_zero(&self, x: &Self::Elem) -> bool;

    /// Whether `r = op(a, b)` is acceptable. The primal sweep stops at the
    /// first instruction for which this returns false.
    fn admissible(&self, _op: OpCode, _a: &Self::Elem, _b: &Self::Elem, _r: &Self::Elem) -> bool {
        true
    }
}

// ── Real ──

/// Numeric evaluation over `F`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Real<F> {
    policy: DomainPolicy,
    _marker: PhantomData<F>,
}

impl<F: Float> Real<F> {
    pub fn new(policy: DomainPolicy) -> Self {
        Self {
            policy,
            _marker: PhantomData,
        }
    }
}

impl<F: Float> Algebra for Real<F> {
    type Elem = F;

    #[inline]
    fn zero(&mut self) -> F {
        F::zero()
    }

    #[inline]
    fn constant(&mut self, value: f64) -> F {
        F::from_literal(value)
    }

    #[inline]
    fn eval(&mut self, op: OpCode, a: &F, b: &F) -> F {
        opcode::eval_forward(op, *a, *b)
    }

    #[inline]
    fn partials(&mut self, op: OpCode, a: &F, b: &F, r: &F) -> (F, F) {
        opcode::reverse_partials(op, *a, *b, *r)
    }

    #[inline]
    fn add(&mut self, x: &F, y: &F) -> F {
        *x + *y
    }

    #[inline]
    fn mul(&mut self, x: &F, y: &F) -> F {
        *x * *y
    }

    #[inline]
    fn is_zero(&self, x: &F) -> bool {
        *x == F::zero()
    }

    #[inline]
    fn admissible(&self, op: OpCode, a: &F, b: &F, r: &F) -> bool {
        match self.policy {
            DomainPolicy::Propagate => true,
            DomainPolicy::Reject => {
                let finite_in = a.is_finite() && (!op.is_binary() || b.is_finite());
                !finite_in || r.is_finite()
            }
        }
    }
}

// ── Bits ──

/// Dependency masks: one bit per seed direction.
///
/// Every result depends on everything its operands depend on, so `eval` is
/// OR, the partials are all-ones, accumulation is OR and scaling is AND.
/// Numeric cancellation is never exploited.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bits;

impl Algebra for Bits {
    type Elem = u64;

    #[inline]
    fn zero(&mut self) -> u64 {
        0
    }

    #[inline]
    fn constant(&mut self, _value: f64) -> u64 {
        0
    }

    #[inline]
    fn eval(&mut self, _op: OpCode, a: &u64, b: &u64) -> u64 {
        a | b
    }

    #[inline]
    fn partials(&mut self, _op: OpCode, _a: &u64, _b: &u64, _r: &u64) -> (u64, u64) {
        (!0, !0)
    }

    #[inline]
    fn add(&mut self, x: &u64, y: &u64) -> u64 {
        x | y
    }

    #[inline]
    fn mul(&mut self, x: &u64, y: &u64) -> u64 {
        x & y
    }

    #[inline]
    fn is_zero(&self, x: &u64) -> bool {
        *x == 0
    }
}

// ── Symbolic ──

/// Re-emits each instruction as scalar nodes of an [`ExprGraph`].
///
/// Operations on constants fold, and additions of zero or multiplications by
/// zero and one are simplified away so derivative graphs stay small.
pub struct Symbolic<'g> {
    graph: &'g mut ExprGraph,
}

impl<'g> Symbolic<'g> {
    pub fn new(graph: &'g mut ExprGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&mut self) -> &mut ExprGraph {
        self.graph
    }

    fn unary(&mut self, op: OpCode, a: ExprId) -> ExprId {
        if let Some(va) = self.graph.literal(a) {
            return self.graph.constant(opcode::eval_forward(op, va, 0.0));
        }
        if op == OpCode::Neg {
            if let crate::graph::Node::Unary(OpCode::Neg, inner) = self.graph.node(a) {
                return *inner;
            }
        }
        self.graph.unary(op, a)
    }

    fn binary(&mut self, op: OpCode, a: ExprId, b: ExprId) -> ExprId {
        if let (Some(va), Some(vb)) = (self.graph.literal(a), self.graph.literal(b)) {
            return self.graph.constant(opcode::eval_forward(op, va, vb));
        }
        let lit = |x: ExprId, v: f64| self.graph.is_literal(x, v);
        let (a0, a1, am1) = (lit(a, 0.0), lit(a, 1.0), lit(a, -1.0));
        let (b0, b1, bm1) = (lit(b, 0.0), lit(b, 1.0), lit(b, -1.0));
        match op {
            OpCode::Add if a0 => return b,
            OpCode::Add | OpCode::Sub if b0 => return a,
            OpCode::Sub if a0 => return self.unary(OpCode::Neg, b),
            OpCode::Mul if a0 || b0 => return ExprId::ZERO,
            OpCode::Mul if a1 => return b,
            OpCode::Mul if b1 => return a,
            OpCode::Mul if am1 => return self.unary(OpCode::Neg, b),
            OpCode::Mul if bm1 => return self.unary(OpCode::Neg, a),
            OpCode::Div if b1 => return a,
            OpCode::Div if a0 => return ExprId::ZERO,
            _ => {}
        }
        self.graph.scalar_binary(op, a, b)
    }

    fn recip(&mut self, a: ExprId) -> ExprId {
        self.binary(OpCode::Div, ExprId::ONE, a)
    }
}

impl Algebra for Symbolic<'_> {
    type Elem = ExprId;

    #[inline]
    fn zero(&mut self) -> ExprId {
        ExprId::ZERO
    }

    fn constant(&mut self, value: f64) -> ExprId {
        self.graph.constant(value)
    }

    fn eval(&mut self, op: OpCode, a: &ExprId, b: &ExprId) -> ExprId {
        if op.is_binary() {
            self.binary(op, *a, *b)
        } else {
            self.unary(op, *a)
        }
    }

    fn partials(&mut self, op: OpCode, a: &ExprId, b: &ExprId, r: &ExprId) -> (ExprId, ExprId) {
        let (a, b, r) = (*a, *b, *r);
        let zero = ExprId::ZERO;
        let one = ExprId::ONE;
        let two = ExprId::TWO;
        match op {
            OpCode::Const => (zero, zero),

            // Binary
            OpCode::Add => (one, one),
            OpCode::Sub => {
                let m1 = self.graph.constant(-1.0);
                (one, m1)
            }
            OpCode::Mul => (b, a),
            OpCode::Div => {
                let inv = self.recip(b);
                let q = self.binary(OpCode::Mul, r, inv);
                (inv, self.unary(OpCode::Neg, q))
            }
            OpCode::Pow => {
                let bm1 = self.binary(OpCode::Sub, b, one);
                let p = self.binary(OpCode::Pow, a, bm1);
                let da = self.binary(OpCode::Mul, b, p);
                // ln(a + 1 - sign(a)^2): zero at a == 0, matching the numeric rule.
                let s = self.unary(OpCode::Sign, a);
                let s2 = self.unary(OpCode::Sq, s);
                let hole = self.binary(OpCode::Sub, one, s2);
                let shifted = self.binary(OpCode::Add, a, hole);
                let la = self.unary(OpCode::Ln, shifted);
                (da, self.binary(OpCode::Mul, r, la))
            }
            OpCode::Atan2 => {
                let a2 = self.unary(OpCode::Sq, a);
                let b2 = self.unary(OpCode::Sq, b);
                let denom = self.binary(OpCode::Add, a2, b2);
                let da = self.binary(OpCode::Div, b, denom);
                let na = self.unary(OpCode::Neg, a);
                (da, self.binary(OpCode::Div, na, denom))
            }
            OpCode::Hypot => (self.binary(OpCode::Div, a, r), self.binary(OpCode::Div, b, r)),
            OpCode::Fmin | OpCode::Fmax => {
                // Selects by sign(b - a); ties split the derivative evenly.
                let d = self.binary(OpCode::Sub, b, a);
                let s = self.unary(OpCode::Sign, d);
                let half = self.graph.constant(0.5);
                let hs = self.binary(OpCode::Mul, half, s);
                let (pa, pb) = if op == OpCode::Fmin {
                    (self.binary(OpCode::Add, half, hs), self.binary(OpCode::Sub, half, hs))
                } else {
                    (self.binary(OpCode::Sub, half, hs), self.binary(OpCode::Add, half, hs))
                };
                (pa, pb)
            }

            // Unary
            OpCode::Neg => (self.graph.constant(-1.0), zero),
            OpCode::Recip => {
                let r2 = self.unary(OpCode::Sq, r);
                (self.unary(OpCode::Neg, r2), zero)
            }
            OpCode::Sq => (self.binary(OpCode::Mul, two, a), zero),
            OpCode::Sqrt => {
                let tr = self.binary(OpCode::Mul, two, r);
                (self.recip(tr), zero)
            }
            OpCode::Cbrt => {
                let three = self.graph.constant(3.0);
                let r2 = self.unary(OpCode::Sq, r);
                let d = self.binary(OpCode::Mul, three, r2);
                (self.recip(d), zero)
            }

            // Exp/Log
            OpCode::Exp => (r, zero),
            OpCode::ExpM1 => (self.binary(OpCode::Add, r, one), zero),
            OpCode::Ln => (self.recip(a), zero),
            OpCode::Ln1p => {
                let d = self.binary(OpCode::Add, one, a);
                (self.recip(d), zero)
            }

            // Trig
            OpCode::Sin => (self.unary(OpCode::Cos, a), zero),
            OpCode::Cos => {
                let s = self.unary(OpCode::Sin, a);
                (self.unary(OpCode::Neg, s), zero)
            }
            OpCode::Tan => {
                let r2 = self.unary(OpCode::Sq, r);
                (self.binary(OpCode::Add, one, r2), zero)
            }
            OpCode::Asin | OpCode::Acos => {
                let a2 = self.unary(OpCode::Sq, a);
                let d = self.binary(OpCode::Sub, one, a2);
                let s = self.unary(OpCode::Sqrt, d);
                let inv = self.recip(s);
                if op == OpCode::Asin {
                    (inv, zero)
                } else {
                    (self.unary(OpCode::Neg, inv), zero)
                }
            }
            OpCode::Atan => {
                let a2 = self.unary(OpCode::Sq, a);
                let d = self.binary(OpCode::Add, one, a2);
                (self.recip(d), zero)
            }

            // Hyperbolic
            OpCode::Sinh => (self.unary(OpCode::Cosh, a), zero),
            OpCode::Cosh => (self.unary(OpCode::Sinh, a), zero),
            OpCode::Tanh => {
                let r2 = self.unary(OpCode::Sq, r);
                (self.binary(OpCode::Sub, one, r2), zero)
            }
            OpCode::Asinh | OpCode::Acosh => {
                let a2 = self.unary(OpCode::Sq, a);
                let d = if op == OpCode::Asinh {
                    self.binary(OpCode::Add, a2, one)
                } else {
                    self.binary(OpCode::Sub, a2, one)
                };
                let s = self.unary(OpCode::Sqrt, d);
                (self.recip(s), zero)
            }
            OpCode::Atanh => {
                let a2 = self.unary(OpCode::Sq, a);
                let d = self.binary(OpCode::Sub, one, a2);
                (self.recip(d), zero)
            }

            // Non-smooth
            OpCode::Abs => (self.unary(OpCode::Sign, a), zero),
            OpCode::Sign | OpCode::Floor | OpCode::Ceil | OpCode::Round | OpCode::Trunc => {
                (zero, zero)
            }
        }
    }

    fn add(&mut self, x: &ExprId, y: &ExprId) -> ExprId {
        self.binary(OpCode::Add, *x, *y)
    }

    fn mul(&mut self, x: &ExprId, y: &ExprId) -> ExprId {
        self.binary(OpCode::Mul, *x, *y)
    }

    fn is_zero(&self, x: &ExprId) -> bool {
        self.graph.is_literal(*x, 0.0)
    }
}
