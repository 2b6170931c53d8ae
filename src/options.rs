//! Configuration for building, evaluating and propagating over tapes.
//!
//! All structs implement `Default`; setters consume and return `self`.

/// Algorithm builder settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildOptions {
    /// Reuse slots whose last reader has been emitted.
    pub reuse_slots: bool,
    /// Merge scalar instructions with identical opcode and operands, and
    /// share constants with identical bits.
    pub cse: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            reuse_slots: true,
            cse: true,
        }
    }
}

impl BuildOptions {
    pub fn reuse_slots(mut self, on: bool) -> Self {
        self.reuse_slots = on;
        self
    }

    pub fn cse(mut self, on: bool) -> Self {
        self.cse = on;
        self
    }
}

/// What numeric evaluation does when an operation leaves its real domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DomainPolicy {
    /// Let IEEE NaN/inf flow through to the outputs.
    #[default]
    Propagate,
    /// Fail on the first instruction that maps finite operands to a non-finite result.
    Reject,
}

/// Numeric and derivative evaluation settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EvalOptions {
    pub domain_policy: DomainPolicy,
    /// Seed directions packed into one sweep when assembling Jacobians.
    pub directions_per_sweep: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            domain_policy: DomainPolicy::Propagate,
            directions_per_sweep: 8,
        }
    }
}

impl EvalOptions {
    pub fn domain_policy(mut self, policy: DomainPolicy) -> Self {
        self.domain_policy = policy;
        self
    }

    /// Clamped to at least one.
    pub fn directions_per_sweep(mut self, n: usize) -> Self {
        self.directions_per_sweep = n.max(1);
        self
    }
}

/// Which sparsity propagation strategy to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendKind {
    #[default]
    Sequential,
    /// rayon over seed batches (`parallel` feature).
    Parallel,
    /// wgpu compute shader (`gpu-wgpu` feature).
    Gpu,
}

/// Sparsity propagation settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SparsityOptions {
    pub backend: BackendKind,
}

impl SparsityOptions {
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.backend = kind;
        self
    }
}
