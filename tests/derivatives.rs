//! Forward and reverse sweeps, dense and compressed Jacobians.

use approx::assert_relative_eq;
use tapegraph::{EvalOptions, EvaluationError, ExprGraph, Sparsity, Tape};

/// `out0 = x * y + sin(x)` (elementwise, `x` of length 3, `y` scalar) and
/// `out1 = x[0] * x[2]`.
fn mixed_tape() -> Tape {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 3);
    let y = g.scalar_symbol("y");
    let xy = g.mul(x, y).unwrap();
    let sx = g.sin(x);
    let out0 = g.add(xy, sx).unwrap();
    let x0 = g.nonzero(x, 0).unwrap();
    let x2 = g.nonzero(x, 2).unwrap();
    let out1 = g.mul(x0, x2).unwrap();
    Tape::build(&g, &[x, y], &[out0, out1]).unwrap()
}

const X: [f64; 3] = [0.3, -1.1, 2.0];
const Y: f64 = 0.7;

fn point() -> Vec<Vec<f64>> {
    vec![X.to_vec(), vec![Y]]
}

fn scalar_tape(build: impl FnOnce(&mut ExprGraph, tapegraph::ExprId) -> tapegraph::ExprId) -> Tape {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let out = build(&mut g, x);
    Tape::build(&g, &[x], &[out]).unwrap()
}

fn central_difference(tape: &Tape, x: f64) -> f64 {
    let h = 1e-6;
    let up = tape.evaluate(&[vec![x + h]]).unwrap()[0][0];
    let down = tape.evaluate(&[vec![x - h]]).unwrap()[0][0];
    (up - down) / (2.0 * h)
}

// ── Scalar derivatives ──

#[test]
fn product_of_two_scalars_both_modes() {
    let mut g = ExprGraph::new();
    let a = g.scalar_symbol("a");
    let b = g.scalar_symbol("b");
    let p = g.mul(a, b).unwrap();
    let tape = Tape::build(&g, &[a, b], &[p]).unwrap();
    let at = [vec![3.0], vec![4.0]];

    let fwd = tape
        .forward_ad(&at, &[vec![vec![1.0], vec![0.0]], vec![vec![0.0], vec![1.0]]])
        .unwrap();
    assert_eq!(fwd.outputs, vec![vec![12.0]]);
    assert_eq!(fwd.sensitivities[0], vec![vec![4.0]]);
    assert_eq!(fwd.sensitivities[1], vec![vec![3.0]]);

    let rev = tape.reverse_ad(&at, &[vec![vec![1.0]]]).unwrap();
    assert_eq!(rev.sensitivities[0], vec![vec![4.0], vec![3.0]]);
}

#[test]
fn smooth_ops_match_finite_differences() {
    let builders: Vec<fn(&mut ExprGraph, tapegraph::ExprId) -> tapegraph::ExprId> = vec![
        |g, x| {
            let s = g.sin(x);
            g.exp(s)
        },
        |g, x| {
            let c = g.constant(2.5);
            g.pow(x, c).unwrap()
        },
        |g, x| {
            let q = g.sq(x);
            let one = g.constant(1.0);
            let d = g.add(q, one).unwrap();
            g.ln(d)
        },
        |g, x| g.unary(tapegraph::OpCode::Atan, x),
        |g, x| g.unary(tapegraph::OpCode::Tanh, x),
        |g, x| {
            let c = g.constant(0.4);
            g.binary(tapegraph::OpCode::Atan2, x, c).unwrap()
        },
        |g, x| {
            let c = g.constant(3.0);
            g.binary(tapegraph::OpCode::Hypot, x, c).unwrap()
        },
        |g, x| g.unary(tapegraph::OpCode::Cbrt, x),
        |g, x| g.unary(tapegraph::OpCode::Asin, x),
    ];
    for build in builders {
        let tape = scalar_tape(build);
        let x0 = 0.6;
        let fd = central_difference(&tape, x0);
        let fwd = tape.forward_ad(&[vec![x0]], &[vec![vec![1.0]]]).unwrap();
        let rev = tape.gradient(&[vec![x0]], 0).unwrap();
        assert_relative_eq!(fwd.sensitivities[0][0][0], fd, max_relative = 1e-6);
        assert_relative_eq!(rev[0][0], fwd.sensitivities[0][0][0], max_relative = 1e-14);
    }
}

#[test]
fn repeated_operand_doubles() {
    let tape = scalar_tape(|g, x| g.mul(x, x).unwrap());
    let grad = tape.gradient(&[vec![1.5]], 0).unwrap();
    assert_eq!(grad, vec![vec![3.0]]);
}

#[test]
fn identity_tape_differentiates_trivially() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 2);
    let tape = Tape::build(&g, &[x], &[x]).unwrap();
    assert_eq!(tape.num_instructions(), 0);

    let point = [vec![0.3, -1.2]];
    let fwd = tape.forward_ad(&point, &[vec![vec![1.0, 0.0]]]).unwrap();
    assert_eq!(fwd.outputs, vec![vec![0.3, -1.2]]);
    assert_eq!(fwd.sensitivities, vec![vec![vec![1.0, 0.0]]]);

    let rev = tape.reverse_ad(&point, &[vec![vec![0.0, 1.0]]]).unwrap();
    assert_eq!(rev.sensitivities, vec![vec![vec![0.0, 1.0]]]);

    assert_eq!(
        tape.jacobian(&point, 0, 0).unwrap(),
        vec![vec![1.0, 0.0], vec![0.0, 1.0]]
    );
}

#[test]
fn diamond_accumulates_both_paths() {
    // sin(x) * cos(x) = sin(2x) / 2
    let tape = scalar_tape(|g, x| {
        let s = g.sin(x);
        let c = g.cos(x);
        g.mul(s, c).unwrap()
    });
    let x0 = 0.35f64;
    let grad = tape.gradient(&[vec![x0]], 0).unwrap();
    assert_relative_eq!(grad[0][0], (2.0 * x0).cos(), max_relative = 1e-14);
}

#[test]
fn long_chain_with_reused_slots() {
    let tape = scalar_tape(|g, x| {
        let mut e = x;
        for _ in 0..30 {
            e = g.sin(e);
        }
        e
    });
    let x0 = 0.9;
    let fd = central_difference(&tape, x0);
    let grad = tape.gradient(&[vec![x0]], 0).unwrap();
    assert_relative_eq!(grad[0][0], fd, max_relative = 1e-6);
}

#[test]
fn absolute_value_at_kink_uses_zero_subgradient() {
    let tape = scalar_tape(|g, x| g.unary(tapegraph::OpCode::Abs, x));
    assert!(!tape.is_smooth());
    assert_eq!(tape.gradient(&[vec![-2.0]], 0).unwrap(), vec![vec![-1.0]]);
    assert_eq!(tape.gradient(&[vec![0.0]], 0).unwrap(), vec![vec![0.0]]);
}

// ── Blocks and seeds ──

#[test]
fn forward_directions_match_columns() {
    let tape = mixed_tape();
    let dir = vec![vec![0.0, 1.0, 0.0], vec![0.0]];
    let dy = vec![vec![0.0; 3], vec![1.0]];
    let res = tape.forward_ad(&point(), &[dir, dy]).unwrap();

    // d/dx1
    assert_eq!(res.sensitivities[0][0][0], 0.0);
    assert_relative_eq!(res.sensitivities[0][0][1], Y + X[1].cos(), max_relative = 1e-14);
    assert_eq!(res.sensitivities[0][1], vec![0.0]);
    // d/dy
    assert_eq!(res.sensitivities[1][0], X.to_vec());
    assert_eq!(res.sensitivities[1][1], vec![0.0]);
}

#[test]
fn reverse_weights_outputs() {
    let tape = mixed_tape();
    let w = vec![vec![1.0, 0.0, 0.0], vec![2.0]];
    let res = tape.reverse_ad(&point(), &[w]).unwrap();
    let dx = &res.sensitivities[0][0];
    assert_relative_eq!(dx[0], Y + X[0].cos() + 2.0 * X[2], max_relative = 1e-14);
    assert_eq!(dx[1], 0.0);
    assert_relative_eq!(dx[2], 2.0 * X[0], max_relative = 1e-14);
    assert_relative_eq!(res.sensitivities[0][1][0], X[0], max_relative = 1e-14);
}

#[test]
fn seed_shape_is_checked() {
    let tape = mixed_tape();
    let err = tape
        .forward_ad(&point(), &[vec![vec![1.0, 0.0], vec![0.0]]])
        .unwrap_err();
    assert_eq!(
        err,
        EvaluationError::SeedShape {
            direction: 0,
            block: 0,
            expected: 3,
            found: 2
        }
    );
    let err = tape.reverse_ad(&point(), &[vec![vec![1.0; 3]]]).unwrap_err();
    assert_eq!(
        err,
        EvaluationError::InputCount {
            expected: 2,
            found: 1
        }
    );
}

#[test]
fn zero_directions_still_evaluate() {
    let tape = mixed_tape();
    let res = tape.forward_ad::<f64, _>(&point(), &[]).unwrap();
    assert!(res.sensitivities.is_empty());
    assert_eq!(res.outputs, tape.evaluate(&point()).unwrap());
}

#[test]
fn gradient_requires_single_nonzero_output() {
    let tape = mixed_tape();
    assert_eq!(
        tape.gradient(&point(), 0).unwrap_err(),
        EvaluationError::NotScalar { output: 0 }
    );
    let grad = tape.gradient(&point(), 1).unwrap();
    assert_eq!(grad, vec![vec![X[2], 0.0, X[0]], vec![0.0]]);
}

#[test]
fn out_of_range_block_index() {
    let tape = mixed_tape();
    assert!(matches!(
        tape.jacobian(&point(), 5, 0),
        Err(EvaluationError::IndexOutOfRange { kind: "input", .. })
    ));
}

// ── Jacobians ──

#[test]
fn forward_and_reverse_jacobians_agree() {
    let tape = mixed_tape();
    let mut ev = tape.evaluator::<f64>();
    for (iind, oind) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let fwd = ev.jacobian_forward(&point(), iind, oind).unwrap();
        let rev = ev.jacobian_reverse(&point(), iind, oind).unwrap();
        for (rf, rr) in fwd.iter().zip(&rev) {
            for (a, b) in rf.iter().zip(rr) {
                assert_relative_eq!(*a, *b, max_relative = 1e-14);
            }
        }
    }
}

#[test]
fn dense_jacobian_values() {
    let tape = mixed_tape();
    let jac = tape.jacobian(&point(), 0, 0).unwrap();
    for r in 0..3 {
        for c in 0..3 {
            let expected = if r == c { Y + X[c].cos() } else { 0.0 };
            assert_relative_eq!(jac[r][c], expected, max_relative = 1e-14);
        }
    }
    let jy = tape.jacobian(&point(), 1, 0).unwrap();
    assert_eq!(jy, vec![vec![X[0]], vec![X[1]], vec![X[2]]]);
}

#[test]
fn one_direction_per_sweep_gives_same_jacobian() {
    let tape = mixed_tape();
    let wide = tape.jacobian(&point(), 0, 0).unwrap();
    let mut ev = tape.evaluator_with::<f64>(EvalOptions::default().directions_per_sweep(1));
    assert_eq!(ev.jacobian(&point(), 0, 0).unwrap(), wide);
}

#[test]
fn compressed_jacobian_matches_dense() {
    let tape = mixed_tape();
    let dense = tape.jacobian(&point(), 0, 0).unwrap();
    let (pattern, values) = tape.sparse_jacobian(&point(), 0, 0).unwrap();
    assert_eq!(pattern, Sparsity::diagonal(3));
    for (k, (r, c)) in pattern.iter().enumerate() {
        assert_relative_eq!(values[k], dense[r][c], max_relative = 1e-14);
    }
}

#[test]
fn compressed_jacobian_of_banded_map() {
    // y_i = x_{i-1} * x_i * x_{i+1} on a length-6 vector, tridiagonal Jacobian.
    let n = 6;
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n);
    let xs = g.nonzeros(x).unwrap();
    let mut ys = Vec::new();
    for i in 0..n {
        let mut e = xs[i];
        if i > 0 {
            e = g.mul(e, xs[i - 1]).unwrap();
        }
        if i + 1 < n {
            e = g.mul(e, xs[i + 1]).unwrap();
        }
        ys.push(e);
    }
    let y = g.vertcat(&ys).unwrap();
    let tape = Tape::build(&g, &[x], &[y]).unwrap();

    let at = [vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]];
    let dense = tape.jacobian(&at, 0, 0).unwrap();
    let (pattern, values) = tape.sparse_jacobian(&at, 0, 0).unwrap();
    assert_eq!(pattern.nnz(), 3 * n - 2);
    assert!(pattern.column_coloring().1 <= 3);
    for (k, (r, c)) in pattern.iter().enumerate() {
        assert_relative_eq!(values[k], dense[r][c], max_relative = 1e-14);
    }
}
