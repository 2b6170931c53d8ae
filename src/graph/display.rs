//! Pretty-printing for expressions.

use std::fmt;

use super::{ExprGraph, ExprId, Node};

/// Nesting beyond this depth is elided as `...`.
const MAX_DEPTH: usize = 64;

/// `Display` adapter returned by [`ExprGraph::display`].
pub struct ExprDisplay<'g> {
    graph: &'g ExprGraph,
    id: ExprId,
}

impl ExprGraph {
    /// Human-readable rendering of `id`.
    pub fn display(&self, id: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { graph: self, id }
    }
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(self.graph, self.id, f, 0)
    }
}

fn write_expr(g: &ExprGraph, id: ExprId, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    if depth > MAX_DEPTH {
        return f.write_str("...");
    }
    match g.node(id) {
        Node::Symbol(_) => f.write_str(g.symbol_name(id).unwrap_or("?")),
        Node::Constant(bits) => write_literal(f64::from_bits(*bits), f),
        Node::Zeros(r, c) => write!(f, "zeros({r}x{c})"),
        Node::Unary(op, a) => {
            write!(f, "{}(", op.name())?;
            write_expr(g, *a, f, depth + 1)?;
            f.write_str(")")
        }
        Node::Binary(op, a, b) => match op.infix() {
            Some(sym) => {
                f.write_str("(")?;
                write_expr(g, *a, f, depth + 1)?;
                write!(f, " {sym} ")?;
                write_expr(g, *b, f, depth + 1)?;
                f.write_str(")")
            }
            None => {
                write!(f, "{}(", op.name())?;
                write_expr(g, *a, f, depth + 1)?;
                f.write_str(", ")?;
                write_expr(g, *b, f, depth + 1)?;
                f.write_str(")")
            }
        },
        Node::Concat(kind, parts) => {
            write!(f, "{kind}(")?;
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_expr(g, *p, f, depth + 1)?;
            }
            f.write_str(")")
        }
        Node::Transpose(a) => {
            write_expr(g, *a, f, depth + 1)?;
            f.write_str("'")
        }
        Node::GetNonzero(a, k) => {
            write_expr(g, *a, f, depth + 1)?;
            write!(f, "{{{k}}}")
        }
    }
}

fn write_literal(v: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        write!(f, "{}", v as i64)
    } else {
        write!(f, "{v}")
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{ExprGraph, ExprId};

    #[test]
    fn display_simple() {
        let mut g = ExprGraph::new();
        let x = g.scalar_symbol("x");
        let y = g.scalar_symbol("y");
        let sum = g.add(x, y).unwrap();
        assert_eq!(g.display(sum).to_string(), "(x + y)");

        let s = g.sin(x);
        assert_eq!(g.display(s).to_string(), "sin(x)");

        let p = g.pow(x, ExprId::TWO).unwrap();
        assert_eq!(g.display(p).to_string(), "pow(x, 2)");
    }

    #[test]
    fn display_structural() {
        let mut g = ExprGraph::new();
        let a = g.vector_symbol("a", 2);
        let b = g.vector_symbol("b", 3);
        let v = g.vertcat(&[a, b]).unwrap();
        assert_eq!(g.display(v).to_string(), "vertcat(a, b)");
        let t = g.transpose(a);
        assert_eq!(g.display(t).to_string(), "a'");
        let e = g.nonzero(b, 1).unwrap();
        assert_eq!(g.display(e).to_string(), "b{1}");
    }
}
