//! Four destination elements per invocation.
//!
//! [`PackedTransformKernel`] runs batch-to-space over a 2x2 tile of the two
//! trailing destination dimensions and returns the tile as one 4-lane value,
//! laid out like a [`PackedTensor`] cell:
//!
//! | lane | destination          |
//! |------|----------------------|
//! | 0    | `(.., row, col)`     |
//! | 1    | `(.., row, col + 1)` |
//! | 2    | `(.., row + 1, col)` |
//! | 3    | `(.., row + 1, col + 1)` |
//!
//! Only lane 0 goes through the full block/remainder decomposition. Lanes 1-3
//! are one coordinate step away from lane 0 (or from lane 2), and lanes past
//! the destination edge are left at `T::default()`.
//!
//! Reads go through [`PackedSource`]: consecutive lanes whose source positions
//! share a packed cell reuse the fetched cell.

use log::{debug, trace};

use crate::descriptor::{Position, ShapeDescriptor, LANES, RANK};
use crate::error::TransformError;
use crate::index::{floor_div, floor_mod};
use crate::scalar::{Direction, ScalarTransformKernel};
use crate::tensor::{select_lane, PackedSource, PackedTensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedTransformKernel {
    lane0: ScalarTransformKernel,
}

impl PackedTransformKernel {
    pub fn new(descriptor: ShapeDescriptor) -> Self {
        debug!("packed kernel over {} lanes", LANES);
        Self {
            lane0: ScalarTransformKernel::new(descriptor, Direction::BatchToSpace),
        }
    }

    pub fn descriptor(&self) -> &ShapeDescriptor {
        self.lane0.descriptor()
    }

    /// Source positions of the four lanes of the tile whose top-left corner is
    /// `origin`; `None` for lanes outside the destination.
    pub fn lane_positions(&self, origin: &Position) -> [Option<Position>; LANES] {
        let output_shape = self.descriptor().output_shape();
        let next_col = origin[RANK - 1] + 1 < output_shape[RANK - 1];
        let next_row = origin[RANK - 2] + 1 < output_shape[RANK - 2];

        let mut lanes = [None; LANES];
        let base = self.lane0.batch_to_space_position(origin);
        lanes[0] = Some(base);
        if next_col {
            lanes[1] = Some(self.next_column(base));
        }
        if next_row {
            let below = self.advance_batch_axis(base);
            lanes[2] = Some(below);
            if next_col {
                lanes[3] = Some(self.next_column(below));
            }
        }
        lanes
    }

    /// The four lane values of the tile whose top-left corner is `origin`.
    #[inline]
    pub fn compute<T, S>(&self, source: &S, origin: &Position) -> [T; LANES]
    where
        T: Copy + Default,
        S: PackedSource<T> + ?Sized,
    {
        let mut result = [T::default(); LANES];
        let mut cached: Option<(usize, [T; LANES])> = None;
        for (value, lane) in result.iter_mut().zip(self.lane_positions(origin)) {
            if let Some(pos) = lane {
                *value = fetch(source, &pos, &mut cached);
            }
        }
        result
    }

    /// Writes every cell of `dest`.
    pub fn run<T, S>(&self, source: &S, dest: &mut PackedTensor<T>) -> Result<(), TransformError>
    where
        T: Copy + Default,
        S: PackedSource<T> + ?Sized,
    {
        self.lane0.check_shapes(source.shape(), dest.shape())?;
        trace!("packed batch-to-space: {} invocations", dest.num_cells());

        let grid = *dest.grid();
        for (index, cell) in dest.cells_mut().iter_mut().enumerate() {
            *cell = self.compute(source, &crate::tensor::cell_origin(&grid, index));
        }
        Ok(())
    }

    /// Writes every cell of `dest`, one rayon task per cell.
    #[cfg(feature = "parallel")]
    pub fn run_parallel<T, S>(
        &self,
        source: &S,
        dest: &mut PackedTensor<T>,
    ) -> Result<(), TransformError>
    where
        T: Copy + Default + Send,
        S: PackedSource<T> + Sync + ?Sized,
    {
        use rayon::prelude::*;

        self.lane0.check_shapes(source.shape(), dest.shape())?;
        trace!("packed batch-to-space: {} invocations in parallel", dest.num_cells());

        let grid = *dest.grid();
        dest.cells_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, cell)| {
                *cell = self.compute(source, &crate::tensor::cell_origin(&grid, index));
            });
        Ok(())
    }

    /// Neighbor along the last destination dimension: the next channel, or
    /// the next batch-axis slot when the source has a single channel.
    #[inline(always)]
    fn next_column(&self, mut pos: Position) -> Position {
        if self.descriptor().batch_shape()[RANK - 1] > 1 {
            pos[RANK - 1] += 1;
            pos
        } else {
            self.advance_batch_axis(pos)
        }
    }

    /// Steps the batch axis by one block cell along the innermost spatial
    /// dimension, carrying into the spatial coordinate when the block offset
    /// wraps.
    #[inline(always)]
    fn advance_batch_axis(&self, mut pos: Position) -> Position {
        let d = self.descriptor();
        let block = d.block_shape()[RANK - 3];
        let batch = d.output_batch();
        if floor_mod(floor_div(pos[0], batch), block) + 1 < block {
            pos[0] += batch;
        } else {
            pos[0] -= (block - 1) * batch;
            pos[RANK - 2] += 1;
        }
        pos
    }
}

#[inline(always)]
fn fetch<T, S>(source: &S, pos: &Position, cached: &mut Option<(usize, [T; LANES])>) -> T
where
    T: Copy + Default,
    S: PackedSource<T> + ?Sized,
{
    let Some(index) = source.cell_index(pos) else {
        return T::default();
    };
    let cell = match *cached {
        Some((key, cell)) if key == index => cell,
        _ => {
            let cell = source.cell(index);
            *cached = Some((index, cell));
            cell
        }
    };
    select_lane(&cell, [pos[RANK - 2], pos[RANK - 1]])
}
