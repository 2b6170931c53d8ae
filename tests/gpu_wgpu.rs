#![cfg(feature = "gpu-wgpu")]

use tapegraph::{Direction, ExprGraph, Sequential, Tape, WgpuContext};

/// Try to acquire a GPU. If none available, print a warning and return None.
fn gpu_context() -> Option<WgpuContext> {
    match WgpuContext::new() {
        Some(ctx) => Some(ctx),
        None => {
            eprintln!("WARNING: No GPU adapter found, skipping GPU test");
            None
        }
    }
}

/// `y_i = sin(x_i) * x_{i+k}` wrapping around, with a constant mixed in.
fn stencil(n: usize, k: usize) -> Tape {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", n);
    let xs = g.nonzeros(x).unwrap();
    let c = g.constant(1.5);
    let mut ys = Vec::with_capacity(n);
    for i in 0..n {
        let s = g.sin(xs[i]);
        let p = g.mul(s, xs[(i + k) % n]).unwrap();
        ys.push(g.add(p, c).unwrap());
    }
    let y = g.vertcat(&ys).unwrap();
    Tape::build(&g, &[x], &[y]).unwrap()
}

#[test]
fn gpu_matches_sequential_small() {
    let Some(ctx) = gpu_context() else { return };
    let tape = stencil(10, 3);
    for dir in [Direction::Forward, Direction::Adjoint] {
        let cpu = tape.jac_sparsity_with(&Sequential, 0, 0, dir).unwrap();
        let gpu = tape.jac_sparsity_with(&ctx, 0, 0, dir).unwrap();
        assert_eq!(gpu, cpu, "{dir:?}");
    }
}

#[test]
fn gpu_matches_sequential_many_words() {
    let Some(ctx) = gpu_context() else { return };
    // 100 seeds need four 32-bit words.
    let tape = stencil(100, 37);
    for dir in [Direction::Forward, Direction::Adjoint] {
        let cpu = tape.jac_sparsity_dir(0, 0, dir).unwrap();
        let gpu = tape.jac_sparsity_with(&ctx, 0, 0, dir).unwrap();
        assert_eq!(gpu, cpu, "{dir:?}");
        assert_eq!(gpu.nnz(), 200);
    }
}

#[test]
fn gpu_handles_identity_tape() {
    let Some(ctx) = gpu_context() else { return };
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 5);
    let tape = Tape::build(&g, &[x], &[x]).unwrap();
    let gpu = tape
        .jac_sparsity_with(&ctx, 0, 0, Direction::Forward)
        .unwrap();
    assert_eq!(gpu, tape.jac_sparsity(0, 0).unwrap());
}
