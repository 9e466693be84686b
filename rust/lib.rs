//! # spacebatch - Space-to-Batch and Batch-to-Space Coordinate Transforms
//!
//! * Index arithmetic behind dilated (atrous) convolution on rank-4 tensors.
//! * Scalar kernels: one destination element per invocation, both directions.
//! * Packed kernel: one 2x2 destination tile per invocation, 4 lanes at once.
//! * Exact integer floor division and modulo, no floating-point shortcuts.
//! * Element-type agnostic: anything `Copy + Default` moves through.
//!
//! ## Layout
//!
//! Tensors are `[batch, height, width, channels]`. The *batch tensor* holds
//! `prod(block_shape)` interleaved phases of the *space tensor* along its
//! leading axis:
//!
//! ```text
//! batch[(oy * bw + ox) * N + n, y, x, c] == space[n, y * bh + oy - crop_h, x * bw + ox - crop_w, c]
//! ```
//!
//! A [`ShapeDescriptor`] fixes block shape, crops and both shapes once; the
//! kernels built from it are immutable and can be invoked concurrently, each
//! invocation writing a disjoint part of the destination.
//!
//! # Example
//!
//! ```rust
//! use spacebatch::{make_packed_transform, make_scalar_transform, Crop, PackedTensor, Position, Tensor};
//!
//! let batch = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[4, 1, 1, 1]);
//!
//! let scalar = make_scalar_transform([2, 2], [1, 1, 1, 1], [4, 1, 1, 1], [Crop::zero(); 2], 2, [1, 2, 2, 1]);
//! assert_eq!(scalar.compute(&batch, &Position::new([0, 1, 1, 0])), 4.0);
//!
//! let packed = make_packed_transform([2, 2], [1, 1, 1, 1], [4, 1, 1, 1], [Crop::zero(); 2], 2, [1, 2, 2, 1]);
//! let lanes = packed.compute(&PackedTensor::from_tensor(&batch), &Position::new([0, 1, 0, 0]));
//! assert_eq!(lanes, [3.0, 0.0, 4.0, 0.0]);
//! ```
//!
//! # Errors
//!
//! The kernels never fail. Shapes that break the descriptor preconditions
//! produce wrong positions, and reads that land outside the source yield
//! `T::default()`. Validate with [`ShapeDescriptor::try_new`] or use the
//! [`batch_to_space_nd`] / [`space_to_batch_nd`] ops, which return
//! [`TransformError`].
//!
//! # Features
//!
//! * `parallel` - `run_parallel` on both kernels, backed by rayon.

pub mod descriptor;
pub mod error;
pub mod index;
pub mod ops;
pub mod packed;
pub mod scalar;
pub mod tensor;

pub use descriptor::{
    batch_to_space_shape, space_to_batch_shape, Crop, Position, Positions, ShapeDescriptor, LANES,
    NUM_BLOCK_DIMS, RANK,
};
pub use error::{Shape, TransformError};
pub use index::{floor_div, floor_mod, linear_index, multi_index, row_major_strides, Coord};
pub use ops::{
    batch_to_space_nd, batch_to_space_nd_packed, space_to_batch_nd, Transform, TransformMode,
};
pub use packed::PackedTransformKernel;
pub use scalar::{Direction, ScalarTransformKernel};
pub use tensor::{select_lane, PackedSource, PackedTensor, Source, Tensor};

/// Builds the scalar batch-to-space kernel.
///
/// No validation is performed; see [`ShapeDescriptor::new`].
pub fn make_scalar_transform(
    block_shape: [Coord; NUM_BLOCK_DIMS],
    strides: [Coord; RANK],
    batch_shape: [Coord; RANK],
    crops: [Crop; NUM_BLOCK_DIMS],
    num_block_dims: usize,
    output_shape: [Coord; RANK],
) -> ScalarTransformKernel {
    let descriptor = ShapeDescriptor::new(
        block_shape,
        strides,
        batch_shape,
        crops,
        num_block_dims,
        output_shape,
    );
    ScalarTransformKernel::new(descriptor, Direction::BatchToSpace)
}

/// Builds the packed batch-to-space kernel.
///
/// No validation is performed; see [`ShapeDescriptor::new`].
pub fn make_packed_transform(
    block_shape: [Coord; NUM_BLOCK_DIMS],
    strides: [Coord; RANK],
    batch_shape: [Coord; RANK],
    crops: [Crop; NUM_BLOCK_DIMS],
    num_block_dims: usize,
    output_shape: [Coord; RANK],
) -> PackedTransformKernel {
    let descriptor = ShapeDescriptor::new(
        block_shape,
        strides,
        batch_shape,
        crops,
        num_block_dims,
        output_shape,
    );
    PackedTransformKernel::new(descriptor)
}

/// Builds a batch-to-space transform in the requested mode.
pub fn make_transform(
    mode: TransformMode,
    block_shape: [Coord; NUM_BLOCK_DIMS],
    strides: [Coord; RANK],
    batch_shape: [Coord; RANK],
    crops: [Crop; NUM_BLOCK_DIMS],
    num_block_dims: usize,
    output_shape: [Coord; RANK],
) -> Transform {
    let descriptor = ShapeDescriptor::new(
        block_shape,
        strides,
        batch_shape,
        crops,
        num_block_dims,
        output_shape,
    );
    Transform::new(mode, descriptor)
}
