//! GPU sparsity propagation (`gpu-wgpu` feature).
//!
//! The tape is flattened into per-instruction `u32` arrays and every
//! invocation of the compute kernel runs the whole tape for one 32-bit seed
//! word. Results are bit-identical to [`Sequential`](crate::backend::Sequential).
//! Device buffers live only for the duration of one propagation call.

use crate::tape::Tape;

pub mod wgpu_backend;

pub use wgpu_backend::WgpuContext;

/// Error type for GPU operations.
#[derive(Debug)]
pub enum GpuError {
    /// No suitable GPU adapter or device found.
    NoDevice,
    /// The working array for all seed words exceeds the device's storage limit.
    OutOfMemory,
    /// Mapping the readback buffer failed.
    BufferMap(String),
    /// Backend-specific error.
    Other(String),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::NoDevice => write!(f, "no suitable GPU device found"),
            GpuError::OutOfMemory => write!(f, "GPU storage limit exceeded"),
            GpuError::BufferMap(msg) => write!(f, "buffer map failed: {msg}"),
            GpuError::Other(msg) => write!(f, "GPU error: {msg}"),
        }
    }
}

impl std::error::Error for GpuError {}

/// Tape flattened for upload. Storage buffers may not be empty, so every
/// array holds at least one (ignored) element.
pub(crate) struct GpuTapeData {
    pub arity: Vec<u32>,
    pub out: Vec<u32>,
    pub arg0: Vec<u32>,
    pub arg1: Vec<u32>,
    pub num_instructions: u32,
    pub num_slots: u32,
}

impl GpuTapeData {
    pub fn from_tape(tape: &Tape) -> Self {
        let ins = tape.instructions();
        let pad = |mut v: Vec<u32>| {
            if v.is_empty() {
                v.push(0);
            }
            v
        };
        Self {
            arity: pad(ins.iter().map(|i| i.op.arity() as u32).collect()),
            out: pad(ins.iter().map(|i| i.out).collect()),
            arg0: pad(ins.iter().map(|i| i.args[0]).collect()),
            arg1: pad(ins.iter().map(|i| i.args[1]).collect()),
            num_instructions: ins.len() as u32,
            num_slots: tape.num_slots() as u32,
        }
    }
}

/// Kernel parameters.
///
/// Layout matches the WGSL `Meta` struct (4 × u32 = 16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct SparsityMeta {
    pub num_instructions: u32,
    pub num_slots: u32,
    pub num_words: u32,
    pub _pad: u32,
}
