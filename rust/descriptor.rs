//! Positions, crops and the immutable [`ShapeDescriptor`] of one transform.

use core::ops::{Index, IndexMut};

use crate::error::{Shape, TransformError};
use crate::index::{row_major_strides, Coord};

// region: Constants

/// Rank of every tensor the kernels handle: batch, two spatial axes, channel.
pub const RANK: usize = 4;

/// Number of spatial (blocked) dimensions, `RANK - 2`.
pub const NUM_BLOCK_DIMS: usize = RANK - 2;

/// Scalars per packed storage cell, and lanes per packed invocation.
pub const LANES: usize = 4;

// endregion: Constants

// region: Position

/// A multi-index into a rank-4 tensor.
///
/// Dimension 0 is the batch axis, the last dimension the channel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Position([Coord; RANK]);

impl Position {
    pub const fn new(coords: [Coord; RANK]) -> Self {
        Self(coords)
    }

    pub fn as_array(&self) -> &[Coord; RANK] {
        &self.0
    }

    /// Whether every coordinate lies in `[0, shape[dim])`.
    pub fn is_within(&self, shape: &[Coord; RANK]) -> bool {
        self.0.iter().zip(shape).all(|(&p, &d)| p >= 0 && p < d)
    }
}

impl From<[Coord; RANK]> for Position {
    fn from(coords: [Coord; RANK]) -> Self {
        Self(coords)
    }
}

impl Index<usize> for Position {
    type Output = Coord;

    #[inline(always)]
    fn index(&self, dim: usize) -> &Coord {
        &self.0[dim]
    }
}

impl IndexMut<usize> for Position {
    #[inline(always)]
    fn index_mut(&mut self, dim: usize) -> &mut Coord {
        &mut self.0[dim]
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&Shape::from_slice(&self.0), f)
    }
}

/// Row-major iterator over every position of a shape.
#[derive(Debug, Clone)]
pub struct Positions {
    shape: [Coord; RANK],
    next: Option<Position>,
}

impl Positions {
    pub fn new(shape: [Coord; RANK]) -> Self {
        let empty = shape.iter().any(|&d| d <= 0);
        Self {
            shape,
            next: (!empty).then(Position::default),
        }
    }
}

impl Iterator for Positions {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        let current = self.next.take()?;
        let mut advanced = current;
        for d in (0..RANK).rev() {
            advanced[d] += 1;
            if advanced[d] < self.shape[d] {
                self.next = Some(advanced);
                break;
            }
            advanced[d] = 0;
        }
        Some(current)
    }
}

// endregion: Position

// region: Crop

/// Per spatial dimension offsets removed by batch-to-space, or added as
/// padding by space-to-batch.
///
/// Only `start` takes part in the index arithmetic; `end` only bounds the
/// output extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Crop {
    pub start: Coord,
    pub end: Coord,
}

impl Crop {
    pub const fn new(start: Coord, end: Coord) -> Self {
        Self { start, end }
    }

    pub const fn zero() -> Self {
        Self { start: 0, end: 0 }
    }
}

impl From<(Coord, Coord)> for Crop {
    fn from((start, end): (Coord, Coord)) -> Self {
        Self { start, end }
    }
}

// endregion: Crop

// region: ShapeDescriptor

/// Fixed parameters of one transform instance.
///
/// The batch tensor is the one whose leading axis carries the folded blocks
/// (`[N * prod(block), H, W, C]`); the output tensor is the space tensor
/// (`[N, H * bh - crops, W * bw - crops, C]`). Batch-to-space reads the batch
/// tensor and writes the space tensor, space-to-batch does the reverse, and
/// both use the same descriptor.
///
/// Read-only after construction, so one descriptor can be shared by every
/// concurrent invocation of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeDescriptor {
    block_shape: [Coord; NUM_BLOCK_DIMS],
    strides: [Coord; RANK],
    batch_shape: [Coord; RANK],
    crops: [Crop; NUM_BLOCK_DIMS],
    num_block_dims: usize,
    output_shape: [Coord; RANK],
    /// Batch strides of the spatial axes divided by the innermost spatial
    /// stride: the radix weights of the spatial block index.
    interior_strides: [Coord; NUM_BLOCK_DIMS],
}

impl ShapeDescriptor {
    /// Builds a descriptor without validating it.
    ///
    /// Array lengths enforce the rank preconditions; divisibility and
    /// stride consistency are the caller's responsibility. Breaking them
    /// yields wrong source positions, never a panic inside the kernels.
    pub fn new(
        block_shape: [Coord; NUM_BLOCK_DIMS],
        strides: [Coord; RANK],
        batch_shape: [Coord; RANK],
        crops: [Crop; NUM_BLOCK_DIMS],
        num_block_dims: usize,
        output_shape: [Coord; RANK],
    ) -> Self {
        let innermost = strides[RANK - 2];
        let mut interior_strides = [0; NUM_BLOCK_DIMS];
        for (i, weight) in interior_strides.iter_mut().enumerate() {
            *weight = strides[i + 1].checked_div(innermost).unwrap_or(0);
        }
        Self {
            block_shape,
            strides,
            batch_shape,
            crops,
            num_block_dims,
            output_shape,
            interior_strides,
        }
    }

    /// Builds a descriptor, checking every precondition of [`Self::new`].
    pub fn try_new(
        block_shape: &[Coord],
        strides: &[Coord],
        batch_shape: &[Coord],
        crops: &[Crop],
        num_block_dims: usize,
        output_shape: &[Coord],
    ) -> Result<Self, TransformError> {
        if num_block_dims != NUM_BLOCK_DIMS {
            return Err(TransformError::DimensionMismatch {
                expected: NUM_BLOCK_DIMS,
                got: num_block_dims,
            });
        }
        let output_shape: [Coord; RANK] = fixed(output_shape)?;
        let batch_shape: [Coord; RANK] = fixed(batch_shape)?;
        let strides: [Coord; RANK] = fixed(strides)?;

        let expected = batch_to_space_shape(&batch_shape, block_shape, crops)?;
        if expected != output_shape {
            return Err(TransformError::ShapeMismatch {
                expected: Shape::from_slice(&expected),
                got: Shape::from_slice(&output_shape),
            });
        }
        if strides != row_major_strides(&batch_shape) {
            return Err(TransformError::NonContiguousStrides {
                shape: Shape::from_slice(&batch_shape),
                got: Shape::from_slice(&strides),
            });
        }

        Ok(Self::new(
            fixed(block_shape)?,
            strides,
            batch_shape,
            fixed(crops)?,
            num_block_dims,
            output_shape,
        ))
    }

    /// Descriptor for unfolding a batch tensor of `batch_shape`.
    pub fn for_batch_to_space(
        batch_shape: &[Coord],
        block_shape: &[Coord],
        crops: &[Crop],
    ) -> Result<Self, TransformError> {
        let output_shape = batch_to_space_shape(batch_shape, block_shape, crops)?;
        let batch_shape: [Coord; RANK] = fixed(batch_shape)?;
        Self::try_new(
            block_shape,
            &row_major_strides(&batch_shape),
            &batch_shape,
            crops,
            NUM_BLOCK_DIMS,
            &output_shape,
        )
    }

    /// Descriptor for folding a space tensor of `space_shape` padded by `paddings`.
    pub fn for_space_to_batch(
        space_shape: &[Coord],
        block_shape: &[Coord],
        paddings: &[Crop],
    ) -> Result<Self, TransformError> {
        let batch_shape = space_to_batch_shape(space_shape, block_shape, paddings)?;
        Self::try_new(
            block_shape,
            &row_major_strides(&batch_shape),
            &batch_shape,
            paddings,
            NUM_BLOCK_DIMS,
            space_shape,
        )
    }

    pub fn block_shape(&self) -> &[Coord; NUM_BLOCK_DIMS] {
        &self.block_shape
    }

    /// Element strides of the batch tensor.
    pub fn strides(&self) -> &[Coord; RANK] {
        &self.strides
    }

    pub fn batch_shape(&self) -> &[Coord; RANK] {
        &self.batch_shape
    }

    pub fn crops(&self) -> &[Crop; NUM_BLOCK_DIMS] {
        &self.crops
    }

    pub fn num_block_dims(&self) -> usize {
        self.num_block_dims
    }

    /// Shape of the space tensor: the batch-to-space destination.
    pub fn output_shape(&self) -> &[Coord; RANK] {
        &self.output_shape
    }

    /// Leading extent of the space tensor.
    #[inline(always)]
    pub fn output_batch(&self) -> Coord {
        self.output_shape[0]
    }

    /// Number of cells in one block, `prod(block_shape)`.
    pub fn block_volume(&self) -> Coord {
        self.block_shape.iter().product()
    }

    #[inline(always)]
    pub(crate) fn crop_start(&self, spatial: usize) -> Coord {
        self.crops[spatial].start
    }

    #[inline(always)]
    pub(crate) fn interior_stride(&self, spatial: usize) -> Coord {
        self.interior_strides[spatial]
    }
}

/// Shape of the space tensor produced by unfolding `batch_shape`.
pub fn batch_to_space_shape(
    batch_shape: &[Coord],
    block_shape: &[Coord],
    crops: &[Crop],
) -> Result<[Coord; RANK], TransformError> {
    let batch_shape: [Coord; RANK] = fixed(batch_shape)?;
    let block_shape: [Coord; NUM_BLOCK_DIMS] = fixed(block_shape)?;
    let crops: [Crop; NUM_BLOCK_DIMS] = fixed(crops)?;
    check_extents(&batch_shape, &block_shape)?;
    check_offsets(&crops)?;

    let volume: Coord = block_shape.iter().product();
    if batch_shape[0] % volume != 0 {
        return Err(TransformError::IndivisibleExtent {
            dim: 0,
            extent: batch_shape[0],
            block: volume,
        });
    }

    let mut output = batch_shape;
    output[0] = batch_shape[0] / volume;
    for (i, (&block, crop)) in block_shape.iter().zip(&crops).enumerate() {
        let full = batch_shape[i + 1] * block;
        if crop.start + crop.end >= full {
            return Err(TransformError::InvalidCrop {
                dim: i + 1,
                start: crop.start,
                end: crop.end,
                reason: "crop removes the whole extent",
            });
        }
        output[i + 1] = full - crop.start - crop.end;
    }
    Ok(output)
}

/// Shape of the batch tensor produced by folding `space_shape` padded by `paddings`.
pub fn space_to_batch_shape(
    space_shape: &[Coord],
    block_shape: &[Coord],
    paddings: &[Crop],
) -> Result<[Coord; RANK], TransformError> {
    let space_shape: [Coord; RANK] = fixed(space_shape)?;
    let block_shape: [Coord; NUM_BLOCK_DIMS] = fixed(block_shape)?;
    let paddings: [Crop; NUM_BLOCK_DIMS] = fixed(paddings)?;
    check_extents(&space_shape, &block_shape)?;
    check_offsets(&paddings)?;

    let mut batch = space_shape;
    batch[0] = space_shape[0] * block_shape.iter().product::<Coord>();
    for (i, (&block, pad)) in block_shape.iter().zip(&paddings).enumerate() {
        let padded = space_shape[i + 1] + pad.start + pad.end;
        if padded % block != 0 {
            return Err(TransformError::IndivisibleExtent {
                dim: i + 1,
                extent: padded,
                block,
            });
        }
        batch[i + 1] = padded / block;
    }
    Ok(batch)
}

fn fixed<T: Copy + Default, const N: usize>(values: &[T]) -> Result<[T; N], TransformError> {
    if values.len() != N {
        return Err(TransformError::DimensionMismatch {
            expected: N,
            got: values.len(),
        });
    }
    let mut out = [T::default(); N];
    out.copy_from_slice(values);
    Ok(out)
}

fn check_extents(
    shape: &[Coord; RANK],
    block_shape: &[Coord; NUM_BLOCK_DIMS],
) -> Result<(), TransformError> {
    if shape.iter().any(|&d| d <= 0) {
        return Err(TransformError::InvalidShape {
            shape: Shape::from_slice(shape),
            reason: "non-positive dimension",
        });
    }
    if block_shape.iter().any(|&b| b <= 0) {
        return Err(TransformError::InvalidShape {
            shape: Shape::from_slice(block_shape),
            reason: "block sizes must be positive",
        });
    }
    Ok(())
}

fn check_offsets(offsets: &[Crop; NUM_BLOCK_DIMS]) -> Result<(), TransformError> {
    for (i, crop) in offsets.iter().enumerate() {
        if crop.start < 0 || crop.end < 0 {
            return Err(TransformError::InvalidCrop {
                dim: i + 1,
                start: crop.start,
                end: crop.end,
                reason: "negative offset",
            });
        }
    }
    Ok(())
}

// endregion: ShapeDescriptor
