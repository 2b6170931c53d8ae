//! Jacobian sparsity propagation and backend selection.

use tapegraph::{
    backend_for, Direction, EvaluationError, ExprGraph, Sequential, Sparsity, SparsityBackend,
    SparsityOptions, Tape,
};

/// `y_i = x_{i-1} * x_i * x_{i+1}` on a vector of length `n`.
fn banded(n: usize) -> Tape {
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

fn tridiagonal(n: usize) -> Sparsity {
    let mut entries = Vec::new();
    for i in 0..n {
        for j in i.saturating_sub(1)..(i + 2).min(n) {
            entries.push((i, j));
        }
    }
    Sparsity::from_triplets(n, n, &entries).unwrap()
}

// ── Patterns ──

#[test]
fn sum_depends_on_both_inputs() {
    let mut g = ExprGraph::new();
    let a = g.scalar_symbol("a");
    let b = g.scalar_symbol("b");
    let s = g.add(a, b).unwrap();
    let tape = Tape::build(&g, &[a, b], &[s]).unwrap();
    assert!(tape.depends_on(0, 0).unwrap());
    assert!(tape.depends_on(1, 0).unwrap());
    assert_eq!(tape.jac_sparsity(0, 0).unwrap(), Sparsity::dense(1, 1));
}

#[test]
fn identity_passes_through() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 4);
    let tape = Tape::build(&g, &[x], &[x]).unwrap();
    assert_eq!(tape.jac_sparsity(0, 0).unwrap(), Sparsity::diagonal(4));
}

#[test]
fn banded_pattern_both_directions() {
    let tape = banded(10);
    let fwd = tape.jac_sparsity_dir(0, 0, Direction::Forward).unwrap();
    let adj = tape.jac_sparsity_dir(0, 0, Direction::Adjoint).unwrap();
    assert_eq!(fwd, tridiagonal(10));
    assert_eq!(fwd, adj);
}

#[test]
fn more_seeds_than_one_batch() {
    // 150 nonzeros spans three 64-bit batches.
    let tape = banded(150);
    let fwd = tape.jac_sparsity_dir(0, 0, Direction::Forward).unwrap();
    let adj = tape.jac_sparsity_dir(0, 0, Direction::Adjoint).unwrap();
    assert_eq!(fwd, tridiagonal(150));
    assert_eq!(adj, fwd);
}

#[test]
fn concatenation_pattern() {
    let mut g = ExprGraph::new();
    let a = g.vector_symbol("a", 2);
    let b = g.vector_symbol("b", 3);
    let v = g.vertcat(&[a, b]).unwrap();
    let tape = Tape::build(&g, &[a, b], &[v]).unwrap();

    let ja = tape.jac_sparsity(0, 0).unwrap();
    assert_eq!(ja.shape(), (5, 2));
    assert_eq!(ja.iter().collect::<Vec<_>>(), vec![(0, 0), (1, 1)]);
    let jb = tape.jac_sparsity(1, 0).unwrap();
    assert_eq!(jb.iter().collect::<Vec<_>>(), vec![(2, 0), (3, 1), (4, 2)]);
}

#[test]
fn constants_carry_no_dependency() {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let y = g.scalar_symbol("y");
    let c = g.constant(4.0);
    let e = g.exp(c);
    let out = g.mul(x, e).unwrap();
    let tape = Tape::build(&g, &[x, y], &[out]).unwrap();
    assert!(tape.depends_on(0, 0).unwrap());
    assert!(!tape.depends_on(1, 0).unwrap());
    assert!(tape.jac_sparsity(1, 0).unwrap().is_empty());
}

#[test]
fn dependency_sets_list_columns_per_row() {
    let tape = banded(4);
    let sets = tape.dependency_sets(0, 0).unwrap();
    assert_eq!(
        sets,
        vec![vec![0, 1], vec![0, 1, 2], vec![1, 2, 3], vec![2, 3]]
    );
}

#[test]
fn reused_slots_do_not_leak_dependencies() {
    // Two independent chains that share temporaries after slot reuse.
    let mut g = ExprGraph::new();
    let a = g.scalar_symbol("a");
    let b = g.scalar_symbol("b");
    let mut ea = a;
    let mut eb = b;
    for _ in 0..5 {
        ea = g.sin(ea);
        eb = g.cos(eb);
    }
    let v = g.vertcat(&[ea, eb]).unwrap();
    let tape = Tape::build(&g, &[a, b], &[v]).unwrap();
    for dir in [Direction::Forward, Direction::Adjoint] {
        let ja = tape.jac_sparsity_dir(0, 0, dir).unwrap();
        assert_eq!(ja.iter().collect::<Vec<_>>(), vec![(0, 0)]);
        let jb = tape.jac_sparsity_dir(1, 0, dir).unwrap();
        assert_eq!(jb.iter().collect::<Vec<_>>(), vec![(1, 0)]);
    }
}

#[test]
fn out_of_range_indices() {
    let tape = banded(3);
    assert!(matches!(
        tape.jac_sparsity(0, 2),
        Err(EvaluationError::IndexOutOfRange { kind: "output", .. })
    ));
    assert!(matches!(
        tape.preferred_direction(1, 0),
        Err(EvaluationError::IndexOutOfRange { kind: "input", .. })
    ));
    assert!(matches!(
        tape.preferred_direction(0, 1),
        Err(EvaluationError::IndexOutOfRange { kind: "output", .. })
    ));
}

#[test]
fn preferred_direction_counts_batches() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 200);
    let xs = g.nonzeros(x).unwrap();
    let s = g.add(xs[0], xs[199]).unwrap();
    let tape = Tape::build(&g, &[x], &[s]).unwrap();
    assert_eq!(tape.preferred_direction(0, 0).unwrap(), Direction::Adjoint);
    assert_eq!(
        tape.jac_sparsity(0, 0).unwrap().iter().collect::<Vec<_>>(),
        vec![(0, 0), (0, 199)]
    );
}

// ── Backends ──

#[test]
fn explicit_sequential_backend() {
    let tape = banded(8);
    let via = tape
        .jac_sparsity_with(&Sequential, 0, 0, Direction::Adjoint)
        .unwrap();
    assert_eq!(via, tape.jac_sparsity(0, 0).unwrap());
    assert_eq!(Sequential.name(), "sequential");
}

#[test]
fn default_backend_is_sequential() {
    let backend = backend_for(&SparsityOptions::default()).unwrap();
    assert_eq!(backend.name(), "sequential");
}

#[cfg(not(feature = "parallel"))]
#[test]
fn parallel_backend_needs_feature() {
    let err = backend_for(&SparsityOptions::default().backend(tapegraph::BackendKind::Parallel)).unwrap_err();
    assert!(matches!(err, tapegraph::Error::BackendUnavailable("parallel")));
}

#[cfg(not(feature = "gpu-wgpu"))]
#[test]
fn gpu_backend_needs_feature() {
    let err = backend_for(&SparsityOptions::default().backend(tapegraph::BackendKind::Gpu)).unwrap_err();
    assert!(matches!(err, tapegraph::Error::BackendUnavailable("gpu-wgpu")));
}
