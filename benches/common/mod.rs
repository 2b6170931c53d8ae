#![allow(dead_code)]

use tapegraph::{ExprGraph, Tape};

// ─── Rosenbrock ────────────────────────────────────────────────────────────

/// Σ (1 - x_i)² + 100 (x_{i+1} - x_i²)² over a vector input of length `n`.
pub fn rosenbrock(n: usize) -> Tape {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n);
    let xs = g.nonzeros(x).unwrap();
    let one = g.constant(1.0);
    let hundred = g.constant(100.0);
    let mut sum = g.constant(0.0);
    for i in 0..n - 1 {
        let t1 = g.sub(one, xs[i]).unwrap();
        let sq = g.sq(xs[i]);
        let t2 = g.sub(xs[i + 1], sq).unwrap();
        let a = g.sq(t1);
        let b2 = g.sq(t2);
        let b = g.mul(hundred, b2).unwrap();
        let term = g.add(a, b).unwrap();
        sum = g.add(sum, term).unwrap();
    }
    Tape::build(&g, &[x], &[sum]).unwrap()
}

// ─── Banded map ────────────────────────────────────────────────────────────

/// `y_i = sin(x_i) * x_{i-1} * x_{i+1}`: tridiagonal Jacobian.
pub fn banded(n: usize) -> Tape {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n);
    let xs = g.nonzeros(x).unwrap();
    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let mut e = g.sin(xs[i]);
        if i > 0 {
            e = g.mul(e, xs[i - 1]).unwrap();
        }
        if i + 1 < n {
            e = g.mul(e, xs[i + 1]).unwrap();
        }
        ys.push(e);
    }
    let y = g.vertcat(&ys).unwrap();
    Tape::build(&g, &[x], &[y]).unwrap()
}

pub fn point(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}
