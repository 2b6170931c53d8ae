use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the numeric element types a tape can be evaluated over (`f32`, `f64`).
///
/// Bundles the numeric and utility traits the evaluators need. Instruction
/// literals are stored as `f64` and narrowed with [`Float::from_literal`].
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Convert an instruction literal into this type.
    fn from_literal(value: f64) -> Self;
}

impl Float for f32 {
    #[inline]
    fn from_literal(value: f64) -> Self {
        value as f32
    }
}

impl Float for f64 {
    #[inline]
    fn from_literal(value: f64) -> Self {
        value
    }
}
