//! Validating whole-tensor operations built on the kernels.
//!
//! These are what a tensor library would call: they check shapes, allocate
//! the destination and run one kernel over it. Shape errors surface here as
//! [`TransformError`]; past this point everything is infallible.

use log::debug;

use crate::descriptor::{Crop, ShapeDescriptor};
use crate::error::TransformError;
use crate::index::Coord;
use crate::packed::PackedTransformKernel;
use crate::scalar::{Direction, ScalarTransformKernel};
use crate::tensor::{PackedTensor, Tensor};

/// Execution strategy of a batch-to-space transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformMode {
    /// One destination element per invocation.
    #[default]
    Scalar,
    /// One 2x2 destination tile per invocation over packed storage.
    Packed,
}

/// A configured transform of either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Scalar(ScalarTransformKernel),
    Packed(PackedTransformKernel),
}

impl Transform {
    pub fn new(mode: TransformMode, descriptor: ShapeDescriptor) -> Self {
        match mode {
            TransformMode::Scalar => {
                Self::Scalar(ScalarTransformKernel::new(descriptor, Direction::BatchToSpace))
            }
            TransformMode::Packed => Self::Packed(PackedTransformKernel::new(descriptor)),
        }
    }

    pub fn mode(&self) -> TransformMode {
        match self {
            Self::Scalar(_) => TransformMode::Scalar,
            Self::Packed(_) => TransformMode::Packed,
        }
    }

    pub fn descriptor(&self) -> &ShapeDescriptor {
        match self {
            Self::Scalar(kernel) => kernel.descriptor(),
            Self::Packed(kernel) => kernel.descriptor(),
        }
    }

    /// Runs the transform over a dense batch tensor and returns the dense
    /// space tensor. Packed mode packs the input and unpacks the result.
    pub fn apply<T: Copy + Default>(&self, input: &Tensor<T>) -> Result<Tensor<T>, TransformError> {
        let output_shape = self.descriptor().output_shape();
        match self {
            Self::Scalar(kernel) => {
                let mut output = Tensor::try_new(output_shape, T::default())?;
                kernel.run(input, &mut output)?;
                Ok(output)
            }
            Self::Packed(kernel) => {
                let source = PackedTensor::from_tensor(input);
                let mut output = PackedTensor::try_new(output_shape)?;
                kernel.run(&source, &mut output)?;
                Ok(output.to_tensor())
            }
        }
    }
}

/// Unfolds the blocks stored along the batch axis of `input` into its
/// spatial axes and removes `crops`.
///
/// # Example
///
/// ```rust
/// use spacebatch::{batch_to_space_nd, Crop, Tensor};
///
/// let input = Tensor::from_slice(&[1, 2, 3, 4], &[4, 1, 1, 1]);
/// let output = batch_to_space_nd(&input, &[2, 2], &[Crop::zero(); 2]).unwrap();
/// assert_eq!(output.shape(), &[1, 2, 2, 1]);
/// assert_eq!(output.as_slice(), &[1, 2, 3, 4]);
/// ```
pub fn batch_to_space_nd<T: Copy + Default>(
    input: &Tensor<T>,
    block_shape: &[Coord],
    crops: &[Crop],
) -> Result<Tensor<T>, TransformError> {
    batch_to_space_with(TransformMode::Scalar, input, block_shape, crops)
}

/// [`batch_to_space_nd`] executed by the packed kernel.
pub fn batch_to_space_nd_packed<T: Copy + Default>(
    input: &Tensor<T>,
    block_shape: &[Coord],
    crops: &[Crop],
) -> Result<Tensor<T>, TransformError> {
    batch_to_space_with(TransformMode::Packed, input, block_shape, crops)
}

fn batch_to_space_with<T: Copy + Default>(
    mode: TransformMode,
    input: &Tensor<T>,
    block_shape: &[Coord],
    crops: &[Crop],
) -> Result<Tensor<T>, TransformError> {
    let descriptor = ShapeDescriptor::for_batch_to_space(input.shape(), block_shape, crops)?;
    debug!(
        "batch_to_space_nd ({:?}): {:?} -> {:?}",
        mode,
        input.shape(),
        descriptor.output_shape()
    );
    Transform::new(mode, descriptor).apply(input)
}

/// Pads the spatial axes of `input` with zeros (`T::default()`) and folds
/// blocks of `block_shape` into the batch axis.
///
/// # Example
///
/// ```rust
/// use spacebatch::{space_to_batch_nd, Crop, Tensor};
///
/// let input = Tensor::from_slice(&[1, 2, 3, 4], &[1, 2, 2, 1]);
/// let output = space_to_batch_nd(&input, &[2, 2], &[Crop::zero(); 2]).unwrap();
/// assert_eq!(output.shape(), &[4, 1, 1, 1]);
/// assert_eq!(output.as_slice(), &[1, 2, 3, 4]);
/// ```
pub fn space_to_batch_nd<T: Copy + Default>(
    input: &Tensor<T>,
    block_shape: &[Coord],
    paddings: &[Crop],
) -> Result<Tensor<T>, TransformError> {
    let descriptor = ShapeDescriptor::for_space_to_batch(input.shape(), block_shape, paddings)?;
    debug!(
        "space_to_batch_nd: {:?} -> {:?}",
        input.shape(),
        descriptor.batch_shape()
    );
    let kernel = ScalarTransformKernel::new(descriptor, Direction::SpaceToBatch);
    let mut output = Tensor::try_new(descriptor.batch_shape(), T::default())?;
    kernel.run(input, &mut output)?;
    Ok(output)
}
