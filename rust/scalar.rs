//! One destination element per invocation.
//!
//! [`ScalarTransformKernel`] maps a destination position to the single source
//! position it copies from, in either direction:
//!
//! - **batch-to-space**: the destination is the space tensor
//!   (`descriptor.output_shape()`), the source the batch tensor;
//! - **space-to-batch**: the destination is the batch tensor, the source the
//!   space tensor. Destination elements that fall into the padding band have
//!   no source and read as `T::default()`.
//!
//! # Example
//!
//! ```rust
//! use spacebatch::{make_scalar_transform, Crop, Position};
//!
//! let kernel = make_scalar_transform([2, 2], [1, 1, 1, 1], [4, 1, 1, 1], [Crop::zero(); 2], 2, [1, 2, 2, 1]);
//! let source = kernel.batch_to_space_position(&Position::new([0, 1, 1, 0]));
//! assert_eq!(source, Position::new([3, 0, 0, 0]));
//! ```

use log::{debug, trace};

use crate::descriptor::{Position, Positions, ShapeDescriptor, NUM_BLOCK_DIMS, RANK};
use crate::error::{Shape, TransformError};
use crate::index::{floor_div, floor_mod, Coord};
use crate::tensor::{Source, Tensor};

/// Which way a kernel moves data between the batch and the space tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Unfold blocks from the batch axis into the spatial axes, then crop.
    BatchToSpace,
    /// Pad the spatial axes, then fold blocks into the batch axis.
    SpaceToBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarTransformKernel {
    descriptor: ShapeDescriptor,
    direction: Direction,
}

impl ScalarTransformKernel {
    pub fn new(descriptor: ShapeDescriptor, direction: Direction) -> Self {
        debug!(
            "scalar {:?} kernel: block {:?}, crops {:?}, batch {:?}, space {:?}",
            direction,
            descriptor.block_shape(),
            descriptor.crops(),
            descriptor.batch_shape(),
            descriptor.output_shape(),
        );
        Self {
            descriptor,
            direction,
        }
    }

    pub fn descriptor(&self) -> &ShapeDescriptor {
        &self.descriptor
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Shape of the tensor this kernel writes.
    pub fn destination_shape(&self) -> &[Coord; RANK] {
        match self.direction {
            Direction::BatchToSpace => self.descriptor.output_shape(),
            Direction::SpaceToBatch => self.descriptor.batch_shape(),
        }
    }

    /// Shape of the tensor this kernel reads.
    pub fn source_shape(&self) -> &[Coord; RANK] {
        match self.direction {
            Direction::BatchToSpace => self.descriptor.batch_shape(),
            Direction::SpaceToBatch => self.descriptor.output_shape(),
        }
    }

    /// Source position for the destination position `pos`, `None` when it
    /// lies in the space-to-batch padding band.
    #[inline]
    pub fn source_position(&self, pos: &Position) -> Option<Position> {
        match self.direction {
            Direction::BatchToSpace => Some(self.batch_to_space_position(pos)),
            Direction::SpaceToBatch => self.space_to_batch_position(pos),
        }
    }

    /// Batch tensor position read by the space tensor position `pos`.
    pub fn batch_to_space_position(&self, pos: &Position) -> Position {
        let d = &self.descriptor;
        let block = d.block_shape();

        // Innermost spatial axis first, so the block index is a mixed-radix
        // number matching the batch tensor's interior layout.
        let mut spatial_block_idx = 0;
        for i in (1..=NUM_BLOCK_DIMS).rev() {
            let padded = pos[i] + d.crop_start(i - 1);
            spatial_block_idx += floor_div(padded, block[i - 1]) * d.interior_stride(i - 1);
        }

        // Offset inside one block, linearized with the same axis order.
        let mut spatial_remainder = 0;
        let mut stride = 1;
        for i in (1..=NUM_BLOCK_DIMS).rev() {
            let padded = pos[i] + d.crop_start(i - 1);
            spatial_remainder += floor_mod(padded, block[i - 1]) * stride;
            stride *= block[i - 1];
        }

        let mut source = Position::default();
        source[0] = spatial_remainder * d.output_batch() + pos[0];

        let batch_shape = d.batch_shape();
        for i in (1..=NUM_BLOCK_DIMS).rev() {
            source[i] = floor_mod(spatial_block_idx, batch_shape[i]);
            spatial_block_idx = floor_div(spatial_block_idx, batch_shape[i]);
        }

        source[RANK - 1] = pos[RANK - 1];
        source
    }

    /// Space tensor position read by the batch tensor position `pos`, `None`
    /// inside the padding band.
    pub fn space_to_batch_position(&self, pos: &Position) -> Option<Position> {
        let d = &self.descriptor;
        let block = d.block_shape();
        let space_shape = d.output_shape();

        let mut source = Position::default();
        source[0] = floor_mod(pos[0], d.output_batch());

        let mut block_cell = floor_div(pos[0], d.output_batch());
        for i in (1..=NUM_BLOCK_DIMS).rev() {
            let offset = floor_mod(block_cell, block[i - 1]);
            block_cell = floor_div(block_cell, block[i - 1]);
            source[i] = pos[i] * block[i - 1] + offset - d.crop_start(i - 1);
        }

        source[RANK - 1] = pos[RANK - 1];
        source.is_within(space_shape).then_some(source)
    }

    /// Value of the destination element at `pos`.
    ///
    /// Padding and out-of-range source positions read as `T::default()`.
    #[inline]
    pub fn compute<T, S>(&self, source: &S, pos: &Position) -> T
    where
        T: Copy + Default,
        S: Source<T> + ?Sized,
    {
        self.source_position(pos)
            .and_then(|p| source.read(&p))
            .unwrap_or_default()
    }

    /// Writes every element of `dest`.
    pub fn run<T, S>(&self, source: &S, dest: &mut Tensor<T>) -> Result<(), TransformError>
    where
        T: Copy + Default,
        S: Source<T> + ?Sized,
    {
        self.check_shapes(source.shape(), dest.shape())?;
        trace!("scalar {:?}: {} invocations", self.direction, dest.len());

        let positions = Positions::new(*dest.shape());
        for (value, pos) in dest.as_mut_slice().iter_mut().zip(positions) {
            *value = self.compute(source, &pos);
        }
        Ok(())
    }

    /// Writes every element of `dest`, one rayon task per innermost row.
    #[cfg(feature = "parallel")]
    pub fn run_parallel<T, S>(&self, source: &S, dest: &mut Tensor<T>) -> Result<(), TransformError>
    where
        T: Copy + Default + Send,
        S: Source<T> + Sync + ?Sized,
    {
        use rayon::prelude::*;

        self.check_shapes(source.shape(), dest.shape())?;
        trace!("scalar {:?}: {} invocations in parallel", self.direction, dest.len());

        let shape = *dest.shape();
        let row_len = shape[RANK - 1] as usize;
        dest.as_mut_slice()
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, values)| {
                let mut pos = Position::new(crate::index::multi_index((row * row_len) as Coord, &shape));
                for value in values {
                    *value = self.compute(source, &pos);
                    pos[RANK - 1] += 1;
                }
            });
        Ok(())
    }

    pub(crate) fn check_shapes(
        &self,
        source: &[Coord; RANK],
        dest: &[Coord; RANK],
    ) -> Result<(), TransformError> {
        for (expected, got) in [(self.source_shape(), source), (self.destination_shape(), dest)] {
            if expected != got {
                return Err(TransformError::ShapeMismatch {
                    expected: Shape::from_slice(expected),
                    got: Shape::from_slice(got),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::descriptor::Crop;

    fn random_tensor(shape: &[Coord], rng: &mut impl Rng) -> Tensor<f32> {
        let total: Coord = shape.iter().product();
        let data: Vec<f32> = (0..total).map(|_| rng.gen()).collect();
        Tensor::try_from_slice(&data, shape).unwrap()
    }

    fn iota(shape: &[Coord]) -> Tensor<i32> {
        let total: Coord = shape.iter().product();
        let data: Vec<i32> = (1..=total as i32).collect();
        Tensor::try_from_slice(&data, shape).unwrap()
    }

    /// Valid (batch shape, block, crops) triples, crops not necessarily block-aligned.
    fn configurations() -> Vec<([Coord; RANK], [Coord; 2], [Crop; 2])> {
        let mut out = Vec::new();
        for block in [[1, 1], [2, 2], [2, 3], [3, 1]] {
            for n in [1, 2] {
                for (h, w) in [(1, 1), (2, 3), (3, 2)] {
                    for c in [1, 2, 3] {
                        let batch = [n * block[0] * block[1], h, w, c];
                        for crops in [
                            [Crop::zero(); 2],
                            [Crop::new(1, 0), Crop::new(0, 1)],
                            [Crop::new(2, 1), Crop::new(1, 1)],
                        ] {
                            if batch_fits(&batch, &block, &crops) {
                                out.push((batch, block, crops));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn batch_fits(batch: &[Coord; RANK], block: &[Coord; 2], crops: &[Crop; 2]) -> bool {
        (0..2).all(|i| crops[i].start + crops[i].end < batch[i + 1] * block[i])
    }

    fn batch_to_space(batch: &[Coord], block: &[Coord], crops: &[Crop]) -> ScalarTransformKernel {
        let d = ShapeDescriptor::for_batch_to_space(batch, block, crops).unwrap();
        ScalarTransformKernel::new(d, Direction::BatchToSpace)
    }

    #[test]
    fn four_cell_batch_unfolds_into_one_block() {
        let kernel = batch_to_space(&[4, 1, 1, 1], &[2, 2], &[Crop::zero(); 2]);
        let expected = [
            ([0, 0, 0, 0], [0, 0, 0, 0]),
            ([0, 0, 1, 0], [1, 0, 0, 0]),
            ([0, 1, 0, 0], [2, 0, 0, 0]),
            ([0, 1, 1, 0], [3, 0, 0, 0]),
        ];
        for (dest, src) in expected {
            assert_eq!(
                kernel.batch_to_space_position(&Position::new(dest)),
                Position::new(src),
            );
        }
    }

    #[test]
    fn batch_to_space_values() {
        // 4x4 image split into four 2x2 phases.
        let batch = Tensor::from_slice(
            &[1, 3, 9, 11, 2, 4, 10, 12, 5, 7, 13, 15, 6, 8, 14, 16],
            &[4, 2, 2, 1],
        );
        let kernel = batch_to_space(&[4, 2, 2, 1], &[2, 2], &[Crop::zero(); 2]);
        let mut space = Tensor::new(&[1, 4, 4, 1], 0);
        kernel.run(&batch, &mut space).unwrap();
        assert_eq!(space.as_slice(), (1..=16).collect::<Vec<i32>>().as_slice());
    }

    #[test]
    fn batch_to_space_keeps_channels() {
        let batch = iota(&[4, 1, 1, 3]);
        let kernel = batch_to_space(&[4, 1, 1, 3], &[2, 2], &[Crop::zero(); 2]);
        let mut space = Tensor::new(&[1, 2, 2, 3], 0);
        kernel.run(&batch, &mut space).unwrap();
        assert_eq!(space.as_slice(), (1..=12).collect::<Vec<i32>>().as_slice());

        // Wider spatial grid with channels: the block index must not mix in C.
        let kernel = batch_to_space(&[4, 2, 3, 2], &[2, 2], &[Crop::zero(); 2]);
        let src = kernel.batch_to_space_position(&Position::new([0, 3, 5, 1]));
        assert_eq!(src, Position::new([3, 1, 2, 1]));
    }

    #[test]
    fn batch_to_space_with_crops() {
        let batch = Tensor::from_slice(
            &[0, 1, 3, 0, 9, 11, 0, 2, 4, 0, 10, 12, 0, 5, 7, 0, 13, 15, 0, 6, 8, 0, 14, 16],
            &[8, 1, 3, 1],
        );
        let kernel = batch_to_space(&[8, 1, 3, 1], &[2, 2], &[Crop::zero(), Crop::new(2, 0)]);
        let mut space = Tensor::new(&[2, 2, 4, 1], 0);
        kernel.run(&batch, &mut space).unwrap();
        assert_eq!(space.as_slice(), (1..=16).collect::<Vec<i32>>().as_slice());
    }

    #[test]
    fn unaligned_crop_matches_direct_formula() {
        for (batch, block, crops) in configurations() {
            let kernel = batch_to_space(&batch, &block, &crops);
            let n = kernel.descriptor().output_batch();
            for pos in Positions::new(*kernel.destination_shape()) {
                let y = pos[1] + crops[0].start;
                let x = pos[2] + crops[1].start;
                let cell = (y % block[0]) * block[1] + x % block[1];
                let direct = Position::new([cell * n + pos[0], y / block[0], x / block[1], pos[3]]);
                assert_eq!(kernel.batch_to_space_position(&pos), direct);
            }
        }
    }

    #[test]
    fn batch_to_space_is_injective_and_in_range() {
        for (batch, block, crops) in configurations() {
            let kernel = batch_to_space(&batch, &block, &crops);
            let mut seen = HashSet::new();
            for pos in Positions::new(*kernel.destination_shape()) {
                let src = kernel.batch_to_space_position(&pos);
                assert!(src.is_within(&batch), "{} -> {} outside {:?}", pos, src, batch);
                assert!(seen.insert(src), "{} -> {} mapped twice", pos, src);
            }
            let uncropped = crops.iter().all(|c| *c == Crop::zero());
            if uncropped {
                assert_eq!(seen.len() as Coord, batch.iter().product::<Coord>());
            }
        }
    }

    #[test]
    fn space_to_batch_values() {
        let space = iota(&[2, 2, 4, 1]);
        let d = ShapeDescriptor::for_space_to_batch(&[2, 2, 4, 1], &[2, 2], &[
            Crop::zero(),
            Crop::new(2, 0),
        ])
        .unwrap();
        let kernel = ScalarTransformKernel::new(d, Direction::SpaceToBatch);
        let mut batch = Tensor::new(&[8, 1, 3, 1], -1);
        kernel.run(&space, &mut batch).unwrap();
        assert_eq!(
            batch.as_slice(),
            &[0, 1, 3, 0, 9, 11, 0, 2, 4, 0, 10, 12, 0, 5, 7, 0, 13, 15, 0, 6, 8, 0, 14, 16]
        );
        assert_eq!(kernel.space_to_batch_position(&Position::new([0, 0, 0, 0])), None);
    }

    #[test]
    fn round_trip_restores_space_tensor() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for (space_shape, block, paddings) in [
            ([2, 4, 6, 3], [2, 2], [Crop::zero(); 2]),
            ([2, 4, 4, 3], [2, 3], [Crop::zero(), Crop::new(1, 1)]),
            ([2, 3, 5, 3], [3, 2], [Crop::new(2, 1), Crop::new(0, 1)]),
        ] {
            let space = random_tensor(&space_shape, &mut rng);

            let d = ShapeDescriptor::for_space_to_batch(&space_shape, &block, &paddings).unwrap();
            let fold = ScalarTransformKernel::new(d, Direction::SpaceToBatch);
            let unfold = ScalarTransformKernel::new(d, Direction::BatchToSpace);

            let mut batch = Tensor::new(d.batch_shape(), 0.0f32);
            fold.run(&space, &mut batch).unwrap();
            let mut restored = Tensor::new(d.output_shape(), 0.0f32);
            unfold.run(&batch, &mut restored).unwrap();
            assert_eq!(restored, space);
        }
    }

    #[test]
    fn out_of_range_source_reads_default() {
        // Batch extent claims 8 cells but the tensor only has 4.
        let d = ShapeDescriptor::new(
            [2, 2],
            [1, 1, 1, 1],
            [4, 1, 1, 1],
            [Crop::zero(); 2],
            2,
            [2, 2, 2, 1],
        );
        let kernel = ScalarTransformKernel::new(d, Direction::BatchToSpace);
        let batch = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[4, 1, 1, 1]);
        let pos = Position::new([0, 1, 1, 0]);
        assert_eq!(kernel.batch_to_space_position(&pos), Position::new([6, 0, 0, 0]));
        assert_eq!(kernel.compute(&batch, &pos), 0.0);
    }

    #[test]
    fn run_rejects_mismatched_buffers() {
        let kernel = batch_to_space(&[4, 1, 1, 1], &[2, 2], &[Crop::zero(); 2]);
        let batch = Tensor::new(&[4, 1, 1, 1], 1.0f32);
        let mut wrong = Tensor::new(&[1, 2, 2, 2], 0.0f32);
        assert!(matches!(
            kernel.run(&batch, &mut wrong),
            Err(TransformError::ShapeMismatch { .. })
        ));
        let mut space = Tensor::new(&[1, 2, 2, 1], 0.0f32);
        assert!(kernel.run(&space.clone(), &mut space).is_err());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let batch = random_tensor(&[8, 3, 2, 2], &mut rng);
        let kernel = batch_to_space(&[8, 3, 2, 2], &[2, 2], &[Crop::new(1, 0), Crop::new(0, 1)]);
        let mut first = Tensor::new(kernel.destination_shape(), 0.0f32);
        let mut second = Tensor::new(kernel.destination_shape(), 0.0f32);
        kernel.run(&batch, &mut first).unwrap();
        kernel.run(&batch, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn element_type_agnostic() {
        use half::f16;

        let data: Vec<f16> = (0..4).map(|i| f16::from_f32(i as f32 + 0.5)).collect();
        let batch = Tensor::from_slice(&data, &[4, 1, 1, 1]);
        let kernel = batch_to_space(&[4, 1, 1, 1], &[2, 2], &[Crop::zero(); 2]);
        let mut space = Tensor::new(&[1, 2, 2, 1], f16::ZERO);
        kernel.run(&batch, &mut space).unwrap();
        assert_eq!(space.as_slice(), data.as_slice());
    }

    #[test]
    #[cfg(feature = "parallel")]
    fn parallel_matches_serial() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let batch = random_tensor(&[12, 4, 5, 3], &mut rng);
        let kernel = batch_to_space(&[12, 4, 5, 3], &[2, 3], &[Crop::new(1, 1), Crop::new(2, 0)]);
        let mut serial = Tensor::new(kernel.destination_shape(), 0.0f32);
        let mut parallel = Tensor::new(kernel.destination_shape(), 0.0f32);
        kernel.run(&batch, &mut serial).unwrap();
        kernel.run_parallel(&batch, &mut parallel).unwrap();
        assert_eq!(serial, parallel);
    }
}
