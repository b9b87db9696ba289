//! Index arithmetic for kernels that broadcast operands.

use smallvec::SmallVec;

use crate::error::Result;
use crate::tensor::Shape;

/// Maps a row-major linear index of `out_shape` to the matching index of `in_shape`.
///
/// `in_shape` must broadcast to `out_shape` under trailing-dimension alignment.
pub fn broadcast_index(linear: usize, out_shape: &Shape, in_shape: &Shape) -> usize {
    let offset = out_shape.rank() - in_shape.rank();
    let in_strides = in_shape.strides();
    let mut remaining = linear;
    let mut index = 0;
    for axis in (0..out_shape.rank()).rev() {
        let dim = out_shape.dims()[axis];
        let coord = if dim == 0 { 0 } else { remaining % dim };
        remaining = if dim == 0 { 0 } else { remaining / dim };
        if axis >= offset {
            let in_axis = axis - offset;
            if in_shape.dims()[in_axis] != 1 {
                index += coord * in_strides[in_axis];
            }
        }
    }
    index
}

/// Precomputed broadcast of several operands onto their common shape.
#[derive(Debug, Clone)]
pub struct BroadcastPlan {
    output: Shape,
    strides: Vec<SmallVec<[usize; 4]>>,
}

impl BroadcastPlan {
    /// Broadcasts every shape together. Fails with a shape mismatch on incompatible dimensions.
    pub fn new(shapes: &[&Shape]) -> Result<Self> {
        let mut output = Shape::scalar();
        for shape in shapes {
            output = output.broadcast_with(shape)?;
        }
        let rank = output.rank();
        let strides = shapes
            .iter()
            .map(|shape| {
                let offset = rank - shape.rank();
                let own = shape.strides();
                (0..rank)
                    .map(|axis| {
                        if axis < offset || shape.dims()[axis - offset] == 1 {
                            0
                        } else {
                            own[axis - offset]
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(Self { output, strides })
    }

    pub fn output_shape(&self) -> &Shape {
        &self.output
    }

    pub fn len(&self) -> usize {
        self.output.num_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index into operand `operand` for output position `linear`.
    pub fn source_index(&self, operand: usize, linear: usize) -> usize {
        let strides = &self.strides[operand];
        let mut remaining = linear;
        let mut index = 0;
        for axis in (0..self.output.rank()).rev() {
            let dim = self.output.dims()[axis];
            if dim == 0 {
                return 0;
            }
            index += (remaining % dim) * strides[axis];
            remaining /= dim;
        }
        index
    }
}
