//! Scalar operation codes shared by the expression graph and the tape.
//!
//! Each opcode is one elementary scalar operation. [`eval_forward`] and
//! [`reverse_partials`] evaluate and differentiate a single opcode; the
//! remaining helpers describe arity, structural-zero behaviour and naming,
//! which the graph, the builder and the code generator all consult.

use num_traits::Float;

/// Sentinel used in `args[1]` for unary instructions and in both slots for constants.
pub const UNUSED: u32 = u32::MAX;

/// Elementary scalar operation codes.
///
/// Fits in a `u8`. Binary ops read both argument slots; unary ops read slot 0
/// only (slot 1 = [`UNUSED`]); [`OpCode::Const`] reads none and carries an
/// inline literal on its instruction.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    // ── Data ──
    /// Scalar literal.
    Const,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Atan2,
    Hypot,
    /// `fmin` semantics: a NaN operand yields the other operand.
    Fmin,
    /// `fmax` semantics: a NaN operand yields the other operand.
    Fmax,

    // ── Unary ──
    Neg,
    Recip,
    Sq,
    Sqrt,
    Cbrt,

    // ── Exp / Log ──
    Exp,
    ExpM1,
    Ln,
    Ln1p,

    // ── Trig ──
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,

    // ── Hyperbolic ──
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,

    // ── Non-smooth ──
    Abs,
    /// -1, 0 or +1; zero and NaN map to themselves.
    Sign,
    /// Zero derivative but needed for re-evaluation.
    Floor,
    /// Zero derivative but needed for re-evaluation.
    Ceil,
    /// Rounds half away from zero.
    Round,
    /// Zero derivative but needed for re-evaluation.
    Trunc,
}

/// All opcodes in declaration order.
pub const ALL_OPCODES: [OpCode; 37] = [
    OpCode::Const,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Pow,
    OpCode::Atan2,
    OpCode::Hypot,
    OpCode::Fmin,
    OpCode::Fmax,
    OpCode::Neg,
    OpCode::Recip,
    OpCode::Sq,
    OpCode::Sqrt,
    OpCode::Cbrt,
    OpCode::Exp,
    OpCode::ExpM1,
    OpCode::Ln,
    OpCode::Ln1p,
    OpCode::Sin,
    OpCode::Cos,
    OpCode::Tan,
    OpCode::Asin,
    OpCode::Acos,
    OpCode::Atan,
    OpCode::Sinh,
    OpCode::Cosh,
    OpCode::Tanh,
    OpCode::Asinh,
    OpCode::Acosh,
    OpCode::Atanh,
    OpCode::Abs,
    OpCode::Sign,
    OpCode::Floor,
    OpCode::Ceil,
    OpCode::Round,
    OpCode::Trunc,
];

/// How an operation treats structurally zero operands.
///
/// Drives the sparsity pattern of matrix-valued unary and binary nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZeroRule {
    /// Unary with `f(0) = 0`: result keeps the operand pattern.
    Preserves,
    /// Binary with `f(0, 0) = 0`: result is the union of the operand patterns.
    Union,
    /// Binary with `f(x, 0) = f(0, y) = 0`: result is the intersection.
    Intersection,
    /// `f(0, y) = 0` only when `y` is stored: zero where `a` is absent and `b` present.
    LeftOperand,
    /// No structural zeros survive.
    Dense,
}

impl OpCode {
    /// Number of operands: 0 for [`OpCode::Const`], 1 for unary, 2 for binary.
    #[inline]
    pub fn arity(self) -> usize {
        match self {
            OpCode::Const => 0,
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Pow
            | OpCode::Atan2
            | OpCode::Hypot
            | OpCode::Fmin
            | OpCode::Fmax => 2,
            _ => 1,
        }
    }

    #[inline]
    pub fn is_binary(self) -> bool {
        self.arity() == 2
    }

    #[inline]
    pub fn is_unary(self) -> bool {
        self.arity() == 1
    }

    /// Operand order does not matter; the graph sorts operands before interning.
    #[inline]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            OpCode::Add | OpCode::Mul | OpCode::Hypot | OpCode::Fmin | OpCode::Fmax
        )
    }

    /// Operations with kinks or jumps where the derivative is undefined.
    #[inline]
    pub fn is_nonsmooth(self) -> bool {
        matches!(
            self,
            OpCode::Abs
                | OpCode::Sign
                | OpCode::Floor
                | OpCode::Ceil
                | OpCode::Round
                | OpCode::Trunc
                | OpCode::Fmin
                | OpCode::Fmax
        )
    }

    /// Structural-zero behaviour of this operation.
    pub fn zero_rule(self) -> ZeroRule {
        match self {
            OpCode::Const => ZeroRule::Dense,
            OpCode::Add
            | OpCode::Sub
            | OpCode::Atan2
            | OpCode::Hypot
            | OpCode::Fmin
            | OpCode::Fmax => ZeroRule::Union,
            OpCode::Mul => ZeroRule::Intersection,
            OpCode::Div => ZeroRule::LeftOperand,
            OpCode::Pow => ZeroRule::Dense,
            OpCode::Recip
            | OpCode::Exp
            | OpCode::Ln
            | OpCode::Cos
            | OpCode::Acos
            | OpCode::Cosh
            | OpCode::Acosh => ZeroRule::Dense,
            _ => ZeroRule::Preserves,
        }
    }

    /// Lower-case mnemonic used by `Display` impls and serialized listings.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Const => "const",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Pow => "pow",
            OpCode::Atan2 => "atan2",
            OpCode::Hypot => "hypot",
            OpCode::Fmin => "fmin",
            OpCode::Fmax => "fmax",
            OpCode::Neg => "neg",
            OpCode::Recip => "recip",
            OpCode::Sq => "sq",
            OpCode::Sqrt => "sqrt",
            OpCode::Cbrt => "cbrt",
            OpCode::Exp => "exp",
            OpCode::ExpM1 => "expm1",
            OpCode::Ln => "log",
            OpCode::Ln1p => "log1p",
            OpCode::Sin => "sin",
            OpCode::Cos => "cos",
            OpCode::Tan => "tan",
            OpCode::Asin => "asin",
            OpCode::Acos => "acos",
            OpCode::Atan => "atan",
            OpCode::Sinh => "sinh",
            OpCode::Cosh => "cosh",
            OpCode::Tanh => "tanh",
            OpCode::Asinh => "asinh",
            OpCode::Acosh => "acosh",
            OpCode::Atanh => "atanh",
            OpCode::Abs => "fabs",
            OpCode::Sign => "sign",
            OpCode::Floor => "floor",
            OpCode::Ceil => "ceil",
            OpCode::Round => "round",
            OpCode::Trunc => "trunc",
        }
    }

    /// Infix symbol for the four arithmetic operators.
    pub fn infix(self) -> Option<&'static str> {
        match self {
            OpCode::Add => Some("+"),
            OpCode::Sub => Some("-"),
            OpCode::Mul => Some("*"),
            OpCode::Div => Some("/"),
            _ => None,
        }
    }
}

/// Evaluate a single opcode in the forward direction.
///
/// For unary ops `b` is ignored. [`OpCode::Const`] carries its value on the
/// instruction and never reaches this function.
#[inline]
pub fn eval_forward<T: Float>(op: OpCode, a: T, b: T) -> T {
    match op {
        OpCode::Const => unreachable!("constants are loaded from the instruction literal"),

        // Binary arithmetic
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Pow => a.powf(b),
        OpCode::Atan2 => a.atan2(b),
        OpCode::Hypot => a.hypot(b),
        OpCode::Fmin => a.min(b),
        OpCode::Fmax => a.max(b),

        // Unary
        OpCode::Neg => -a,
        OpCode::Recip => a.recip(),
        OpCode::Sq => a * a,
        OpCode::Sqrt => a.sqrt(),
        OpCode::Cbrt => a.cbrt(),

        // Exp/Log
        OpCode::Exp => a.exp(),
        OpCode::ExpM1 => a.exp_m1(),
        OpCode::Ln => a.ln(),
        OpCode::Ln1p => a.ln_1p(),

        // Trig
        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
        OpCode::Tan => a.tan(),
        OpCode::Asin => a.asin(),
        OpCode::Acos => a.acos(),
        OpCode::Atan => a.atan(),

        // Hyperbolic
        OpCode::Sinh => a.sinh(),
        OpCode::Cosh => a.cosh(),
        OpCode::Tanh => a.tanh(),
        OpCode::Asinh => a.asinh(),
        OpCode::Acosh => a.acosh(),
        OpCode::Atanh => a.atanh(),

        // Non-smooth
        OpCode::Abs => a.abs(),
        OpCode::Sign => {
            if a > T::zero() {
                T::one()
            } else if a < T::zero() {
                -T::one()
            } else {
                a
            }
        }
        OpCode::Floor => a.floor(),
        OpCode::Ceil => a.ceil(),
        OpCode::Round => a.round(),
        OpCode::Trunc => a.trunc(),
    }
}

/// Local partial derivatives of a single opcode.
///
/// Returns `(∂r/∂a, ∂r/∂b)`; the second partial is zero for unary ops.
/// `r` is the already computed result, reused where it saves work.
#[inline]
pub fn reverse_partials<T: Float>(op: OpCode, a: T, b: T, r: T) -> (T, T) {
    let zero = T::zero();
    let one = T::one();
    let two = one + one;
    match op {
        OpCode::Const => (zero, zero),

        // Binary
        OpCode::Add => (one, one),
        OpCode::Sub => (one, -one),
        OpCode::Mul => (b, a),
        OpCode::Div => {
            let inv = one / b;
            (inv, -a * inv * inv)
        }
        OpCode::Pow => {
            // d/da a^b = b * a^(b-1), d/db a^b = a^b * ln(a)
            let da = b * a.powf(b - one);
            let db = if a == zero { zero } else { r * a.ln() };
            (da, db)
        }
        OpCode::Atan2 => {
            let denom = a * a + b * b;
            (b / denom, -a / denom)
        }
        OpCode::Hypot => (a / r, b / r),
        // Ties split the derivative evenly.
        OpCode::Fmin => {
            if a == b {
                (one / two, one / two)
            } else if a < b || b.is_nan() {
                (one, zero)
            } else {
                (zero, one)
            }
        }
        OpCode::Fmax => {
            if a == b {
                (one / two, one / two)
            } else if a > b || b.is_nan() {
                (one, zero)
            } else {
                (zero, one)
            }
        }

        // Unary
        OpCode::Neg => (-one, zero),
        OpCode::Recip => (-r * r, zero),
        OpCode::Sq => (two * a, zero),
        OpCode::Sqrt => (one / (two * r), zero),
        OpCode::Cbrt => {
            let three = two + one;
            (one / (three * r * r), zero)
        }

        // Exp/Log
        OpCode::Exp => (r, zero),
        OpCode::ExpM1 => (r + one, zero),
        OpCode::Ln => (one / a, zero),
        OpCode::Ln1p => (one / (one + a), zero),

        // Trig
        OpCode::Sin => (a.cos(), zero),
        OpCode::Cos => (-a.sin(), zero),
        OpCode::Tan => (one + r * r, zero),
        OpCode::Asin => (one / (one - a * a).sqrt(), zero),
        OpCode::Acos => (-one / (one - a * a).sqrt(), zero),
        OpCode::Atan => (one / (one + a * a), zero),

        // Hyperbolic
        OpCode::Sinh => (a.cosh(), zero),
        OpCode::Cosh => (a.sinh(), zero),
        OpCode::Tanh => (one - r * r, zero),
        OpCode::Asinh => (one / (a * a + one).sqrt(), zero),
        OpCode::Acosh => (one / (a * a - one).sqrt(), zero),
        OpCode::Atanh => (one / (one - a * a), zero),

        // Non-smooth
        OpCode::Abs => {
            if a > zero {
                (one, zero)
            } else if a < zero {
                (-one, zero)
            } else {
                (zero, zero)
            }
        }
        OpCode::Sign | OpCode::Floor | OpCode::Ceil | OpCode::Round | OpCode::Trunc => {
            (zero, zero)
        }
    }
}
