//! Symbolic sweeps: derivative expressions built back into the graph.

use approx::assert_relative_eq;
use tapegraph::{Error, EvaluationError, ExprGraph, OpCode, Sparsity, Tape};

// ── Re-emission ──

#[test]
fn symbolic_evaluation_reproduces_the_function() {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let s = g.sin(x);
    let f = g.mul(s, y).unwrap();
    let tape = Tape::build(&g, &[x, y], &[f]).unwrap();

    let out = tape.eval_symbolic(&mut g, &[vec![x], vec![y]]).unwrap();
    assert_eq!(out.len(), 1);
    // Re-emission over the same symbols lands on the interned original.
    assert_eq!(out[0][0], f);
}

#[test]
fn symbolic_evaluation_substitutes_inputs() {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let e = g.exp(x);
    let tape = Tape::build(&g, &[x], &[e]).unwrap();

    let t = g.scalar_symbol("t");
    let two_t = g.add(t, t).unwrap();
    let out = tape.eval_symbolic(&mut g, &[vec![two_t]]).unwrap();
    let composed = Tape::build(&g, &[t], &[out[0][0]]).unwrap();
    let v = composed.evaluate(&[vec![0.25]]).unwrap()[0][0];
    assert_relative_eq!(v, 0.5f64.exp(), max_relative = 1e-14);
}

#[test]
fn symbolic_directional_derivative() {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let s = g.sin(x);
    let tape = Tape::build(&g, &[x], &[s]).unwrap();

    let v = g.scalar_symbol("v");
    let res = tape
        .forward_symbolic(&mut g, &[vec![x]], &[vec![vec![v]]])
        .unwrap();
    let dir = Tape::build(&g, &[x, v], &[res.sensitivities[0][0][0]]).unwrap();
    let d = dir.evaluate(&[vec![0.4], vec![3.0]]).unwrap()[0][0];
    assert_relative_eq!(d, 3.0 * 0.4f64.cos(), max_relative = 1e-14);
}

#[test]
fn symbolic_adjoint_of_product() {
    let mut g = ExprGraph::new();
    let a = g.scalar_symbol("a");
    let b = g.scalar_symbol("b");
    let p = g.mul(a, b).unwrap();
    let tape = Tape::build(&g, &[a, b], &[p]).unwrap();

    let one = g.constant(1.0);
    let res = tape
        .reverse_symbolic(&mut g, &[vec![a], vec![b]], &[vec![vec![one]]])
        .unwrap();
    let grads = [res.sensitivities[0][0][0], res.sensitivities[0][1][0]];
    let gt = Tape::build(&g, &[a, b], &grads).unwrap();
    let v = gt.evaluate(&[vec![3.0], vec![4.0]]).unwrap();
    assert_eq!(v, vec![vec![4.0], vec![3.0]]);
}

// ── Agreement with numeric derivatives ──

/// Gradient of `op(x, y)` at `(x0, y0)`, numerically and through the
/// evaluated symbolic adjoint.
fn both_gradients(op: OpCode, x0: f64, y0: f64) -> (Vec<f64>, Vec<f64>) {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let f = g.binary(op, x, y).unwrap();
    let tape = Tape::build(&g, &[x, y], &[f]).unwrap();
    let point = [vec![x0], vec![y0]];
    let numeric = tape.gradient(&point, 0).unwrap().concat();

    let one = g.constant(1.0);
    let res = tape
        .reverse_symbolic(&mut g, &[vec![x], vec![y]], &[vec![vec![one]]])
        .unwrap();
    let grads = [res.sensitivities[0][0][0], res.sensitivities[0][1][0]];
    let gt = Tape::build(&g, &[x, y], &grads).unwrap();
    let symbolic = gt.evaluate(&point).unwrap().concat();
    (numeric, symbolic)
}

#[test]
fn min_max_ties_split_in_both_algebras() {
    for op in [OpCode::Fmin, OpCode::Fmax] {
        let (numeric, symbolic) = both_gradients(op, 0.7, 0.7);
        assert_eq!(numeric, vec![0.5, 0.5], "{op:?}");
        assert_eq!(symbolic, numeric, "{op:?}");
    }
    assert_eq!(both_gradients(OpCode::Fmin, 0.2, 0.9).1, vec![1.0, 0.0]);
    assert_eq!(both_gradients(OpCode::Fmax, 0.2, 0.9).1, vec![0.0, 1.0]);
}

#[test]
fn power_exponent_partial_vanishes_at_zero_base() {
    let (numeric, symbolic) = both_gradients(OpCode::Pow, 0.0, 2.0);
    assert_eq!(numeric, vec![0.0, 0.0]);
    assert_eq!(symbolic, numeric);

    let (numeric, symbolic) = both_gradients(OpCode::Pow, 1.5, 2.5);
    for (n, s) in numeric.iter().zip(&symbolic) {
        assert_relative_eq!(*n, *s, max_relative = 1e-14);
    }
}

// ── Jacobian and Hessian expressions ──

#[test]
fn jacobian_expression_has_propagated_pattern() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 3);
    let y = g.scalar_symbol("y");
    let xy = g.mul(x, y).unwrap();
    let sx = g.sin(x);
    let f = g.add(xy, sx).unwrap();
    let tape = Tape::build(&g, &[x, y], &[f]).unwrap();

    let j = tape.jacobian_expr(&mut g, &[x, y], 0, 0).unwrap();
    assert_eq!(g.sparsity(j), &Sparsity::diagonal(3));

    let jt = Tape::build(&g, &[x, y], &[j]).unwrap();
    let xs: [f64; 3] = [0.1, 0.2, 0.3];
    let v = jt.evaluate(&[xs.to_vec(), vec![2.0]]).unwrap();
    for (k, &xk) in xs.iter().enumerate() {
        assert_relative_eq!(v[0][k], 2.0 + xk.cos(), max_relative = 1e-14);
    }

    let jy = tape.jacobian_expr(&mut g, &[x, y], 1, 0).unwrap();
    assert_eq!(g.shape(jy), (3, 1));
}

#[test]
fn hessian_of_scalar_function() {
    // f = x0^2 * x1 + sin(x1)
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 2);
    let xs = g.nonzeros(x).unwrap();
    let sq = g.sq(xs[0]);
    let prod = g.mul(sq, xs[1]).unwrap();
    let s = g.sin(xs[1]);
    let f = g.add(prod, s).unwrap();
    let tape = Tape::build(&g, &[x], &[f]).unwrap();

    let h = tape.hessian_expr(&mut g, &[x], 0, 0).unwrap();
    assert_eq!(g.shape(h), (2, 2));
    assert!(g.sparsity(h).is_dense());

    let ht = Tape::build(&g, &[x], &[h]).unwrap();
    let (x0, x1) = (0.7f64, -0.2f64);
    let v = ht.evaluate(&[vec![x0, x1]]).unwrap();
    // Column-major: H00, H10, H01, H11.
    assert_relative_eq!(v[0][0], 2.0 * x1, max_relative = 1e-14);
    assert_relative_eq!(v[0][1], 2.0 * x0, max_relative = 1e-14);
    assert_relative_eq!(v[0][2], 2.0 * x0, max_relative = 1e-14);
    assert_relative_eq!(v[0][3], -x1.sin(), max_relative = 1e-14);
}

#[test]
fn hessian_of_linear_function_is_structurally_empty() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 2);
    let xs = g.nonzeros(x).unwrap();
    let f = g.add(xs[0], xs[1]).unwrap();
    let tape = Tape::build(&g, &[x], &[f]).unwrap();

    let h = tape.hessian_expr(&mut g, &[x], 0, 0).unwrap();
    assert_eq!(g.shape(h), (2, 2));
    assert_eq!(g.sparsity(h).nnz(), 0);
}

#[test]
fn hessian_rejects_vector_output() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 2);
    let s = g.sin(x);
    let tape = Tape::build(&g, &[x], &[s]).unwrap();
    let err = tape.hessian_expr(&mut g, &[x], 0, 0).unwrap_err();
    assert!(matches!(
        err,
        Error::Evaluation(EvaluationError::NotScalar { output: 0 })
    ));
}

#[test]
fn symbolic_input_count_is_checked() {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let tape = Tape::build(&g, &[x], &[x]).unwrap();
    let err = tape.eval_symbolic(&mut g, &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Evaluation(EvaluationError::InputCount {
            expected: 1,
            found: 0
        })
    ));
}
