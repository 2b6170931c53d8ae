//! C source generation from a tape.
//!
//! The generated function has the signature
//! `void f(const T* x, T* y, T* w)`: `x` holds every input nonzero in
//! declaration order, `y` every output nonzero, and `w` is caller-provided
//! scratch of `F_SZ_W` entries (the tape's working array). Each instruction
//! becomes one assignment.

use std::fmt::{self, Write as _};

use crate::error::UnsupportedOperationError;
use crate::opcode::OpCode;
use crate::tape::{Instruction, Tape};

/// C language standard targeted by the generated code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dialect {
    /// ANSI C: `<math.h>` has no `cbrt`, `expm1`, `log1p`, `asinh`, `acosh`,
    /// `atanh`, `hypot`, `fmin`, `fmax`, `round` or `trunc`.
    C89,
    #[default]
    C99,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::C89 => "C89",
            Dialect::C99 => "C99",
        })
    }
}

/// Code generation settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CodegenOptions {
    pub dialect: Dialect,
    /// C type of every value, e.g. `double`, `float` or `long double`.
    pub real_type: String,
    pub function_name: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::C99,
            real_type: "double".to_string(),
            function_name: "f".to_string(),
        }
    }
}

impl CodegenOptions {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn real_type(mut self, real_type: impl Into<String>) -> Self {
        self.real_type = real_type.into();
        self
    }

    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    /// `<math.h>` suffix for the real type under C99.
    fn math_suffix(&self) -> &'static str {
        match (self.dialect, self.real_type.as_str()) {
            (Dialect::C99, "float") => "f",
            (Dialect::C99, "long double") => "l",
            _ => "",
        }
    }

    fn literal_suffix(&self) -> &'static str {
        match self.real_type.as_str() {
            "float" => "f",
            "long double" => "L",
            _ => "",
        }
    }
}

/// Generated C source, split into the declarations block and the function
/// definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedCode {
    pub declarations: String,
    pub body: String,
}

impl GeneratedCode {
    /// Declarations followed by the definition, as one translation unit.
    pub fn source(&self) -> String {
        format!("{}\n{}", self.declarations, self.body)
    }
}

impl fmt::Display for GeneratedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.declarations, self.body)
    }
}

/// Whether `op` has an emission rule in `dialect`.
pub fn is_supported(op: OpCode, dialect: Dialect) -> bool {
    match dialect {
        Dialect::C99 => true,
        Dialect::C89 => !matches!(
            op,
            OpCode::Cbrt
                | OpCode::ExpM1
                | OpCode::Ln1p
                | OpCode::Asinh
                | OpCode::Acosh
                | OpCode::Atanh
                | OpCode::Hypot
                | OpCode::Fmin
                | OpCode::Fmax
                | OpCode::Round
                | OpCode::Trunc
        ),
    }
}

fn literal(v: f64, opts: &CodegenOptions) -> String {
    if v.is_nan() {
        return "(0.0/0.0)".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "(1.0/0.0)" } else { "(-1.0/0.0)" }.to_string();
    }
    let text = format!("{v:?}{}", opts.literal_suffix());
    if v.is_sign_negative() {
        format!("({text})")
    } else {
        text
    }
}

fn expression(ins: &Instruction, opts: &CodegenOptions) -> String {
    let a = format!("w[{}]", ins.args[0]);
    let b = format!("w[{}]", ins.args[1]);
    let one = literal(1.0, opts);
    let sfx = opts.math_suffix();
    match ins.op {
        OpCode::Const => literal(ins.literal, opts),
        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
            let sym = ins.op.infix().unwrap_or("+");
            format!("{a}{sym}{b}")
        }
        OpCode::Neg => format!("(-{a})"),
        OpCode::Recip => format!("{one}/{a}"),
        OpCode::Sq => format!("{a}*{a}"),
        OpCode::Sign => format!("({a}>0 ? {one} : ({a}<0 ? -{one} : {a}))"),
        op if op.is_binary() => format!("{}{sfx}({a}, {b})", op.name()),
        op => format!("{}{sfx}({a})", op.name()),
    }
}

impl Tape {
    /// Emit C source computing this tape.
    ///
    /// Fails on the first instruction whose operation has no rule in the
    /// chosen dialect.
    pub fn generate_c(
        &self,
        opts: &CodegenOptions,
    ) -> Result<GeneratedCode, UnsupportedOperationError> {
        if let Some(ins) = self
            .instructions
            .iter()
            .find(|ins| !is_supported(ins.op, opts.dialect))
        {
            return Err(UnsupportedOperationError {
                op: ins.op,
                dialect: opts.dialect,
            });
        }

        let name = &opts.function_name;
        let real = &opts.real_type;
        let macro_prefix = name.to_uppercase();
        let signature = format!("void {name}(const {real}* x, {real}* y, {real}* w)");

        // Writing to a String cannot fail.
        let mut decl = String::new();
        let _ = writeln!(decl, "#include <math.h>");
        let _ = writeln!(decl);
        let _ = writeln!(decl, "#define {macro_prefix}_N_IN {}", self.num_input_nonzeros());
        let _ = writeln!(decl, "#define {macro_prefix}_N_OUT {}", self.num_output_nonzeros());
        let _ = writeln!(decl, "#define {macro_prefix}_SZ_W {}", self.num_slots);
        let _ = writeln!(decl);
        let _ = writeln!(decl, "{signature};");

        let mut body = String::new();
        let _ = writeln!(body, "{signature} {{");
        for k in 0..self.num_input_nonzeros() {
            let _ = writeln!(body, "  w[{k}] = x[{k}];");
        }
        for ins in &self.instructions {
            let _ = writeln!(body, "  w[{}] = {};", ins.out, expression(ins, opts));
        }
        for (k, &s) in self.outputs.iter().flat_map(|b| &b.slots).enumerate() {
            let _ = writeln!(body, "  y[{k}] = w[{s}];");
        }
        let _ = writeln!(body, "}}");

        Ok(GeneratedCode {
            declarations: decl,
            body,
        })
    }
}
