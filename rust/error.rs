//! Error types for the validating surface of the crate.
//!
//! The kernels never fail: they are infallible index arithmetic over shapes the
//! caller already checked. Everything in this module is produced by the
//! `try_*` constructors and the convenience ops in [`crate::ops`].

use crate::index::Coord;

/// Maximum rank a [`Shape`] can describe in an error message.
///
/// Larger than the kernel rank so that a wrongly-ranked input can still be
/// reported verbatim.
pub const MAX_REPORTED_RANK: usize = 8;

// region: Shape

/// Fixed-size shape for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    dims: [Coord; MAX_REPORTED_RANK],
    ndim: usize,
}

impl Shape {
    /// Create from a slice (truncates if > MAX_REPORTED_RANK).
    pub fn from_slice(shape: &[Coord]) -> Self {
        let mut dims = [0; MAX_REPORTED_RANK];
        let ndim = shape.len().min(MAX_REPORTED_RANK);
        dims[..ndim].copy_from_slice(&shape[..ndim]);
        Self { dims, ndim }
    }

    /// Return as a slice.
    pub fn as_slice(&self) -> &[Coord] {
        &self.dims[..self.ndim]
    }
}

impl core::fmt::Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[")?;
        for (i, &d) in self.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// endregion: Shape

// region: TransformError

/// Error type for shape validation and tensor construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Two shapes that must agree do not.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },
    /// Invalid shape specification.
    #[error("invalid shape {shape}: {reason}")]
    InvalidShape { shape: Shape, reason: &'static str },
    /// Expected a specific number of dimensions or per-dimension entries.
    #[error("expected {expected} dimensions, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// A (padded or crop-extended) spatial extent is not a multiple of its block size.
    #[error("extent {extent} of dimension {dim} is not divisible by block size {block}")]
    IndivisibleExtent {
        dim: usize,
        extent: Coord,
        block: Coord,
    },
    /// Crop or padding pair that cannot apply to its dimension.
    #[error("crop ({start}, {end}) on dimension {dim} is invalid: {reason}")]
    InvalidCrop {
        dim: usize,
        start: Coord,
        end: Coord,
        reason: &'static str,
    },
    /// Strides that are not the row-major strides of their shape.
    #[error("strides {got} are not row-major for shape {shape}")]
    NonContiguousStrides { shape: Shape, got: Shape },
}

// endregion: TransformError
