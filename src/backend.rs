//! Interchangeable sparsity propagation strategies.
//!
//! Every backend computes the same dependency relation as [`Sequential`];
//! the others only change where the work runs. Selection is explicit: a
//! backend that is not compiled in, or has no device, is an error, never a
//! silent fallback.

use crate::error::{Error, Result};
use crate::options::{BackendKind, SparsityOptions};
use crate::sparsity::Sparsity;
use crate::tape::{Direction, Tape};

/// Strategy for propagating dependency masks through a tape.
pub trait SparsityBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Jacobian pattern of output `oind` with respect to input `iind`,
    /// `n_out_nz x n_in_nz`. Indices are already range-checked.
    fn propagate(&self, tape: &Tape, iind: usize, oind: usize, dir: Direction) -> Result<Sparsity>;
}

impl std::fmt::Debug for dyn SparsityBackend + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SparsityBackend").field(&self.name()).finish()
    }
}

/// Single-threaded CPU propagation, 64 seeds per sweep.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential;

/// rayon propagation: seed batches run concurrently, each with its own
/// scratch array.
#[cfg(feature = "parallel")]
#[derive(Clone, Copy, Debug, Default)]
pub struct Parallel;

#[cfg(feature = "parallel")]
impl SparsityBackend for Parallel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn propagate(&self, tape: &Tape, iind: usize, oind: usize, dir: Direction) -> Result<Sparsity> {
        use rayon::prelude::*;

        use crate::tape::BATCH_BITS;

        let partials = match dir {
            Direction::Forward => Vec::new(),
            Direction::Adjoint => tape.bit_partials(),
        };
        let pairs: Vec<(usize, usize)> = (0..tape.num_batches(iind, oind, dir, BATCH_BITS))
            .into_par_iter()
            .map_init(Vec::new, |work, batch| {
                let mut pairs = Vec::new();
                tape.propagate_batch(iind, oind, dir, batch, &partials, work, &mut pairs);
                pairs
            })
            .flatten()
            .collect();
        Ok(tape.pattern_from_pairs(iind, oind, &pairs))
    }
}

/// Resolve the configured backend.
pub fn backend_for(options: &SparsityOptions) -> Result<Box<dyn SparsityBackend>> {
    match options.backend {
        BackendKind::Sequential => Ok(Box::new(Sequential)),
        #[cfg(feature = "parallel")]
        BackendKind::Parallel => Ok(Box::new(Parallel)),
        #[cfg(not(feature = "parallel"))]
        BackendKind::Parallel => Err(Error::BackendUnavailable("parallel")),
        #[cfg(feature = "gpu-wgpu")]
        BackendKind::Gpu => match crate::gpu::WgpuContext::new() {
            Some(ctx) => Ok(Box::new(ctx)),
            None => {
                log::warn!("gpu sparsity backend requested but no wgpu adapter is available");
                Err(Error::Gpu(crate::gpu::GpuError::NoDevice))
            }
        },
        #[cfg(not(feature = "gpu-wgpu"))]
        BackendKind::Gpu => Err(Error::BackendUnavailable("gpu-wgpu")),
    }
}
