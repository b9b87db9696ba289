//! Tensor shapes and broadcasting rules.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Result, RuntimeError};

/// Ordered list of non-negative dimension sizes. Rank 0 denotes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new<D: AsRef<[usize]>>(dims: D) -> Self {
        Shape {
            dims: SmallVec::from_slice(dims.as_ref()),
        }
    }

    pub fn scalar() -> Self {
        Shape::default()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements implied by the shape (1 for scalars).
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Computes the multidirectional broadcast of two shapes.
    ///
    /// Dimensions are aligned from the trailing end; a size-1 dimension expands to match the
    /// other operand, and any other disagreement is a shape mismatch.
    pub fn broadcast_with(&self, other: &Shape) -> Result<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims = SmallVec::<[usize; 4]>::with_capacity(rank);
        for axis in 0..rank {
            let lhs = dim_from_end(self, rank - axis);
            let rhs = dim_from_end(other, rank - axis);
            let dim = match (lhs, rhs) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                (a, b) => {
                    return Err(RuntimeError::shape_mismatch(format!(
                        "cannot broadcast {:?} with {:?}: dimension {a} vs {b}",
                        self.dims(),
                        other.dims()
                    )))
                }
            };
            dims.push(dim);
        }
        Ok(Shape { dims })
    }

    /// Checks that `self` can be expanded to `target` without changing `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        matches!(self.broadcast_with(target), Ok(shape) if &shape == target)
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> SmallVec<[usize; 4]> {
        let mut strides = SmallVec::<[usize; 4]>::from_elem(1, self.rank());
        for axis in (0..self.rank().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }
}

fn dim_from_end(shape: &Shape, offset: usize) -> usize {
    if offset > shape.rank() {
        1
    } else {
        shape.dims[shape.rank() - offset]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.dims())
    }
}
