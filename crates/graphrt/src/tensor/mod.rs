//! Tensor and value primitives.
//!
//! Tensors carry a dtype, a shape, and storage owned by one allocator. Execution-frame slots hold
//! [`Value`]s so a slot can also represent "nothing bound yet".

pub mod dtype;
pub mod shape;
#[allow(clippy::module_inception)]
mod tensor;
mod value;

pub use dtype::DType;
pub use shape::Shape;
pub use tensor::{copy_tensor_data, Element, Tensor};
pub use value::Value;
