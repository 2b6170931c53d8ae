//! C source generation.

use tapegraph::{
    codegen::is_supported, CodegenOptions, Dialect, ExprGraph, OpCode, Tape,
    UnsupportedOperationError,
};

fn sum_tape() -> Tape {
    let mut g = ExprGraph::new();
    let a = g.scalar_symbol("a");
    let b = g.scalar_symbol("b");
    let s = g.add(a, b).unwrap();
    Tape::build(&g, &[a, b], &[s]).unwrap()
}

fn unary_tape(op: OpCode) -> Tape {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let out = g.unary(op, x);
    Tape::build(&g, &[x], &[out]).unwrap()
}

// ── Layout ──

#[test]
fn declarations_of_a_sum() {
    let code = sum_tape().generate_c(&CodegenOptions::default()).unwrap();
    assert_eq!(
        code.declarations,
        "#include <math.h>\n\
         \n\
         #define F_N_IN 2\n\
         #define F_N_OUT 1\n\
         #define F_SZ_W 2\n\
         \n\
         void f(const double* x, double* y, double* w);\n"
    );
}

#[test]
fn body_copies_inputs_then_outputs() {
    let tape = sum_tape();
    let code = tape.generate_c(&CodegenOptions::default()).unwrap();
    let lines: Vec<&str> = code.body.lines().collect();
    assert_eq!(lines[0], "void f(const double* x, double* y, double* w) {");
    assert_eq!(lines[1], "  w[0] = x[0];");
    assert_eq!(lines[2], "  w[1] = x[1];");
    assert!(lines[3].ends_with("= w[0]+w[1];"));
    assert!(lines[4].starts_with("  y[0] = w["));
    assert_eq!(lines[5], "}");
    assert_eq!(lines.len(), 6);
}

#[test]
fn function_name_drives_macros() {
    let opts = CodegenOptions::default().function_name("residual");
    let code = sum_tape().generate_c(&opts).unwrap();
    assert!(code.declarations.contains("#define RESIDUAL_N_IN 2"));
    assert!(code.body.starts_with("void residual("));
    assert!(code.source().starts_with("#include <math.h>"));
    assert_eq!(code.to_string(), code.source());
}

#[test]
fn identity_tape_has_no_assignments() {
    let mut g = ExprGraph::new();
    let x = g.vector_symbol("x", 2);
    let tape = Tape::build(&g, &[x], &[x]).unwrap();
    let code = tape.generate_c(&CodegenOptions::default()).unwrap();
    assert!(code.body.contains("  y[0] = w[0];\n  y[1] = w[1];"));
}

// ── Real types and dialects ──

#[test]
fn float_uses_suffixed_math_and_literals() {
    let mut g = ExprGraph::new();
    let x = g.scalar_symbol("x");
    let s = g.sin(x);
    let c = g.constant(2.5);
    let out = g.mul(s, c).unwrap();
    let tape = Tape::build(&g, &[x], &[out]).unwrap();

    let opts = CodegenOptions::default().real_type("float");
    let code = tape.generate_c(&opts).unwrap();
    assert!(code.body.contains("sinf(w[0])"));
    assert!(code.body.contains("2.5f;"));
    assert!(code.declarations.contains("void f(const float* x, float* y, float* w);"));

    let c89 = tape.generate_c(&opts.dialect(Dialect::C89)).unwrap();
    assert!(c89.body.contains("sin(w[0])"));
    assert!(!c89.body.contains("sinf("));
}

#[test]
fn c89_rejects_missing_functions() {
    let opts = CodegenOptions::default().dialect(Dialect::C89);
    let err = unary_tape(OpCode::Cbrt).generate_c(&opts).unwrap_err();
    assert_eq!(
        err,
        UnsupportedOperationError {
            op: OpCode::Cbrt,
            dialect: Dialect::C89
        }
    );
    assert!(unary_tape(OpCode::Sqrt).generate_c(&opts).is_ok());
}

#[test]
fn c99_supports_every_opcode() {
    for op in tapegraph::opcode::ALL_OPCODES {
        assert!(is_supported(op, Dialect::C99), "{op:?}");
    }
}

#[test]
fn sign_and_square_are_inlined() {
    let opts = CodegenOptions::default();
    let sign = unary_tape(OpCode::Sign).generate_c(&opts).unwrap();
    assert!(sign.body.contains("w[0]>0 ? 1.0 : (w[0]<0 ? -1.0 : w[0])"));
    let sq = unary_tape(OpCode::Sq).generate_c(&opts).unwrap();
    assert!(sq.body.contains("= w[0]*w[0];"));
}
