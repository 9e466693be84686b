//! Rank-4 tensor buffers and the read interfaces the kernels consume.
//!
//! This module provides:
//!
//! - [`Source`]: positional scalar read by multi-index
//! - [`PackedSource`]: read of a whole packed storage cell
//! - [`Tensor`]: dense row-major buffer
//! - [`PackedTensor`]: buffer of packed cells, each holding a 2x2 patch of
//!   the two trailing dimensions
//!
//! # Example
//!
//! ```rust
//! use spacebatch::{PackedTensor, Position, Tensor};
//!
//! let data: Vec<f32> = (0..6).map(|i| i as f32).collect();
//! let dense = Tensor::try_from_slice(&data, &[1, 1, 2, 3]).unwrap();
//! let packed = PackedTensor::from_tensor(&dense);
//!
//! // 2x3 trailing patch -> one full cell and one half-empty cell
//! assert_eq!(packed.num_cells(), 2);
//! assert_eq!(packed.get(&Position::new([0, 0, 1, 2])), Some(5.0));
//! assert_eq!(packed.to_tensor(), dense);
//! ```

use crate::descriptor::{Position, Positions, LANES, RANK};
use crate::error::{Shape, TransformError};
use crate::index::{floor_mod, linear_index, multi_index, row_major_strides, Coord};

// region: Source Traits

/// Positional scalar read from a tensor.
pub trait Source<T> {
    /// Shape of the tensor being read.
    fn shape(&self) -> &[Coord; RANK];

    /// Scalar at `pos`, or `None` when `pos` lies outside the shape.
    fn read(&self, pos: &Position) -> Option<T>;
}

/// Read access to packed storage cells.
///
/// A cell holds the 2x2 patch of the two trailing dimensions whose top-left
/// corner has even coordinates. Lane `2 * (row % 2) + (col % 2)` holds the
/// scalar at `(row, col)`; see [`select_lane`].
pub trait PackedSource<T>: Source<T> {
    /// Index of the cell holding `pos`, or `None` when `pos` lies outside the shape.
    fn cell_index(&self, pos: &Position) -> Option<usize>;

    /// The cell at `index`, as returned by [`Self::cell_index`].
    fn cell(&self, index: usize) -> [T; LANES];
}

/// Picks the scalar at the 2-component sub-index `sub` out of a packed cell.
///
/// `sub` is `(row, col)` over the two trailing dimensions; only its parity
/// matters, so either cell-local or tensor coordinates work.
#[inline(always)]
pub fn select_lane<T: Copy>(cell: &[T; LANES], sub: [Coord; 2]) -> T {
    cell[lane_of(sub)]
}

#[inline(always)]
fn lane_of(sub: [Coord; 2]) -> usize {
    (floor_mod(sub[0], 2) * 2 + floor_mod(sub[1], 2)) as usize
}

// endregion: Source Traits

// region: Tensor

/// Dense rank-4 tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    data: Vec<T>,
    shape: [Coord; RANK],
    /// Strides in elements.
    strides: [Coord; RANK],
}

impl<T> Tensor<T> {
    /// Wraps an existing buffer.
    ///
    /// Returns `Err` if the shape is invalid or doesn't match the data length.
    pub fn try_from_vec(data: Vec<T>, shape: &[Coord]) -> Result<Self, TransformError> {
        let shape = checked_shape(shape)?;
        let total: Coord = shape.iter().product();
        if data.len() as Coord != total {
            return Err(TransformError::ShapeMismatch {
                expected: Shape::from_slice(&shape),
                got: Shape::from_slice(&[data.len() as Coord]),
            });
        }
        Ok(Self {
            data,
            shape,
            strides: row_major_strides(&shape),
        })
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[Coord; RANK] {
        &self.shape
    }

    /// Returns the element strides.
    pub fn strides(&self) -> &[Coord; RANK] {
        &self.strides
    }

    /// Returns the stride in elements for the given dimension.
    pub fn stride(&self, dim: usize) -> Coord {
        self.strides[dim]
    }

    /// Returns the total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Flat offset of `pos`, or `None` when it lies outside the shape.
    pub fn offset(&self, pos: &Position) -> Option<usize> {
        pos.is_within(&self.shape)
            .then(|| linear_index(pos.as_array(), &self.strides) as usize)
    }

    pub fn get(&self, pos: &Position) -> Option<&T> {
        self.offset(pos).map(|offset| &self.data[offset])
    }

    pub fn get_mut(&mut self, pos: &Position) -> Option<&mut T> {
        self.offset(pos).map(move |offset| &mut self.data[offset])
    }

    /// Every position of the tensor in storage order.
    pub fn positions(&self) -> Positions {
        Positions::new(self.shape)
    }
}

impl<T: Clone> Tensor<T> {
    /// Creates a new Tensor filled with a value.
    ///
    /// Returns `Err` if the shape is invalid.
    pub fn try_new(shape: &[Coord], value: T) -> Result<Self, TransformError> {
        let shape = checked_shape(shape)?;
        let total: Coord = shape.iter().product();
        Ok(Self {
            data: vec![value; total as usize],
            shape,
            strides: row_major_strides(&shape),
        })
    }

    /// Creates a Tensor from existing slice data.
    ///
    /// Returns `Err` if shape doesn't match data length.
    pub fn try_from_slice(data: &[T], shape: &[Coord]) -> Result<Self, TransformError> {
        Self::try_from_vec(data.to_vec(), shape)
    }

    /// Convenience constructor that panics on error.
    pub fn new(shape: &[Coord], value: T) -> Self {
        Self::try_new(shape, value).expect("Tensor::new failed")
    }

    /// Convenience constructor that panics on error.
    pub fn from_slice(data: &[T], shape: &[Coord]) -> Self {
        Self::try_from_slice(data, shape).expect("Tensor::from_slice failed")
    }
}

impl<T: Copy> Source<T> for Tensor<T> {
    fn shape(&self) -> &[Coord; RANK] {
        &self.shape
    }

    #[inline]
    fn read(&self, pos: &Position) -> Option<T> {
        self.get(pos).copied()
    }
}

fn checked_shape(shape: &[Coord]) -> Result<[Coord; RANK], TransformError> {
    if shape.len() != RANK {
        return Err(TransformError::DimensionMismatch {
            expected: RANK,
            got: shape.len(),
        });
    }
    if shape.iter().any(|&d| d <= 0) {
        return Err(TransformError::InvalidShape {
            shape: Shape::from_slice(shape),
            reason: "non-positive dimension",
        });
    }
    let mut out = [0; RANK];
    out.copy_from_slice(shape);
    Ok(out)
}

// endregion: Tensor

// region: PackedTensor

/// Rank-4 tensor stored as packed cells of 2x2 scalars.
///
/// Cells tile the two trailing dimensions; when an extent is odd the last
/// row or column of cells is half empty and the unused lanes hold
/// `T::default()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedTensor<T> {
    cells: Vec<[T; LANES]>,
    shape: [Coord; RANK],
    /// Shape in cells: the two trailing extents halved, rounded up.
    grid: [Coord; RANK],
    grid_strides: [Coord; RANK],
}

impl<T: Copy + Default> PackedTensor<T> {
    /// Creates a packed tensor with every lane set to `T::default()`.
    pub fn try_new(shape: &[Coord]) -> Result<Self, TransformError> {
        let shape = checked_shape(shape)?;
        Ok(Self::zeroed(shape))
    }

    /// Convenience constructor that panics on error.
    pub fn new(shape: &[Coord]) -> Self {
        Self::try_new(shape).expect("PackedTensor::new failed")
    }

    /// Packs a dense tensor.
    pub fn from_tensor(tensor: &Tensor<T>) -> Self {
        let mut packed = Self::zeroed(tensor.shape);
        for (pos, &value) in tensor.positions().zip(tensor.as_slice()) {
            packed.set(&pos, value);
        }
        packed
    }

    /// Unpacks into a dense tensor, dropping the unused edge lanes.
    pub fn to_tensor(&self) -> Tensor<T> {
        let data = Positions::new(self.shape)
            .map(|pos| self.get(&pos).unwrap_or_default())
            .collect();
        Tensor {
            data,
            shape: self.shape,
            strides: row_major_strides(&self.shape),
        }
    }

    /// Scalar at `pos`, or `None` when it lies outside the shape.
    pub fn get(&self, pos: &Position) -> Option<T> {
        self.cell_offset(pos)
            .map(|index| select_lane(&self.cells[index], [pos[RANK - 2], pos[RANK - 1]]))
    }

    /// Stores `value` at `pos`; returns false when `pos` lies outside the shape.
    pub fn set(&mut self, pos: &Position, value: T) -> bool {
        match self.cell_offset(pos) {
            Some(index) => {
                self.cells[index][lane_of([pos[RANK - 2], pos[RANK - 1]])] = value;
                true
            }
            None => false,
        }
    }

    fn zeroed(shape: [Coord; RANK]) -> Self {
        let grid = packed_grid(&shape);
        let total: Coord = grid.iter().product();
        Self {
            cells: vec![[T::default(); LANES]; total as usize],
            shape,
            grid,
            grid_strides: row_major_strides(&grid),
        }
    }
}

impl<T> PackedTensor<T> {
    /// Logical (unpacked) shape.
    pub fn shape(&self) -> &[Coord; RANK] {
        &self.shape
    }

    /// Shape measured in cells.
    pub fn grid(&self) -> &[Coord; RANK] {
        &self.grid
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[[T; LANES]] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [[T; LANES]] {
        &mut self.cells
    }

    /// Top-left position of the cell at `index`.
    pub fn cell_origin(&self, index: usize) -> Position {
        cell_origin(&self.grid, index)
    }

    fn cell_offset(&self, pos: &Position) -> Option<usize> {
        if !pos.is_within(&self.shape) {
            return None;
        }
        let cell = [pos[0], pos[1], pos[2] / 2, pos[3] / 2];
        Some(linear_index(&cell, &self.grid_strides) as usize)
    }
}

impl<T: Copy + Default> Source<T> for PackedTensor<T> {
    fn shape(&self) -> &[Coord; RANK] {
        &self.shape
    }

    #[inline]
    fn read(&self, pos: &Position) -> Option<T> {
        self.get(pos)
    }
}

impl<T: Copy + Default> PackedSource<T> for PackedTensor<T> {
    #[inline]
    fn cell_index(&self, pos: &Position) -> Option<usize> {
        self.cell_offset(pos)
    }

    #[inline]
    fn cell(&self, index: usize) -> [T; LANES] {
        self.cells[index]
    }
}

pub(crate) fn packed_grid(shape: &[Coord; RANK]) -> [Coord; RANK] {
    let mut grid = *shape;
    grid[RANK - 2] = (shape[RANK - 2] + 1) / 2;
    grid[RANK - 1] = (shape[RANK - 1] + 1) / 2;
    grid
}

pub(crate) fn cell_origin(grid: &[Coord; RANK], index: usize) -> Position {
    let mut origin = multi_index(index as Coord, grid);
    origin[RANK - 2] *= 2;
    origin[RANK - 1] *= 2;
    Position::new(origin)
}

// endregion: PackedTensor
