use std::fmt;

use crate::alloc::{host_allocator, AllocatorPtr, Buffer, MemoryInfo};
use crate::error::{Result, RuntimeError};

use super::{DType, Shape};

/// Scalar types that may be viewed directly inside a tensor buffer.
pub trait Element: bytemuck::Pod + Send + Sync + fmt::Debug {
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;
}

impl Element for i64 {
    const DTYPE: DType = DType::I64;
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;
}

/// Typed multi-dimensional buffer.
///
/// A tensor is either unallocated or owns a buffer of exactly
/// `shape.num_elements() * dtype.size_in_bytes()` bytes.
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    buffer: Option<Buffer>,
}

impl Tensor {
    /// Creates a tensor description without storage.
    pub fn unallocated(dtype: DType, shape: Shape) -> Self {
        Self {
            dtype,
            shape,
            buffer: None,
        }
    }

    /// Allocates storage for `shape` from `allocator`. Contents are unspecified.
    pub fn allocate(dtype: DType, shape: Shape, allocator: &AllocatorPtr) -> Result<Self> {
        let bytes = shape.num_elements() * dtype.size_in_bytes();
        let buffer = Buffer::allocate(allocator, bytes)?;
        Ok(Self {
            dtype,
            shape,
            buffer: Some(buffer),
        })
    }

    /// Builds a host tensor from owned values, validating the length against the shape.
    pub fn from_vec<T: Element>(shape: impl Into<Shape>, values: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        if values.len() != shape.num_elements() {
            return Err(RuntimeError::shape_mismatch(format!(
                "tensor data length ({}) does not match shape {}",
                values.len(),
                shape
            )));
        }
        let mut tensor = Tensor::allocate(T::DTYPE, shape, &host_allocator())?;
        tensor.data_mut::<T>()?.copy_from_slice(&values);
        Ok(tensor)
    }

    pub fn scalar<T: Element>(value: T) -> Result<Self> {
        Tensor::from_vec(Shape::scalar(), vec![value])
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte size implied by shape and dtype.
    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype.size_in_bytes()
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Memory description of the owning allocator, if storage exists.
    pub fn location(&self) -> Option<&MemoryInfo> {
        self.buffer.as_ref().map(|buffer| buffer.allocator().info())
    }

    pub fn allocator(&self) -> Option<&AllocatorPtr> {
        self.buffer.as_ref().map(Buffer::allocator)
    }

    pub fn bytes(&self) -> Result<&[u8]> {
        self.buffer
            .as_ref()
            .map(Buffer::as_bytes)
            .ok_or_else(|| RuntimeError::usage("tensor has no storage"))
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        self.buffer
            .as_mut()
            .map(Buffer::as_bytes_mut)
            .ok_or_else(|| RuntimeError::usage("tensor has no storage"))
    }

    /// Borrows the payload as `T`, failing if the dtype differs.
    pub fn data<T: Element>(&self) -> Result<&[T]> {
        self.expect_dtype(T::DTYPE)?;
        Ok(bytemuck::cast_slice(self.bytes()?))
    }

    /// Mutably borrows the payload as `T`, failing if the dtype differs.
    pub fn data_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        self.expect_dtype(T::DTYPE)?;
        Ok(bytemuck::cast_slice_mut(self.bytes_mut()?))
    }

    /// Copies the payload into a fresh vector.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.data::<T>()?.to_vec())
    }

    fn expect_dtype(&self, dtype: DType) -> Result<()> {
        if self.dtype != dtype {
            return Err(RuntimeError::type_mismatch(format!(
                "tensor holds {} but {} was requested",
                self.dtype, dtype
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape.dims())
            .field(
                "location",
                &self.location().map(|info| info.name.as_str()),
            )
            .finish()
    }
}

/// Checked byte copy between two allocated tensors.
///
/// Providers build `copy_tensor` on this. A dtype or shape disagreement is an error rather than a
/// truncated copy.
pub fn copy_tensor_data(src: &Tensor, dst: &mut Tensor) -> Result<()> {
    if src.dtype() != dst.dtype() {
        return Err(RuntimeError::type_mismatch(format!(
            "copy source is {} but destination is {}",
            src.dtype(),
            dst.dtype()
        )));
    }
    if src.shape() != dst.shape() {
        return Err(RuntimeError::shape_mismatch(format!(
            "copy source shape {} differs from destination shape {}",
            src.shape(),
            dst.shape()
        )));
    }
    let bytes = src.bytes()?;
    dst.bytes_mut()?.copy_from_slice(bytes);
    Ok(())
}
