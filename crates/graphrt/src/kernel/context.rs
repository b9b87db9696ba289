use std::any::Any;
use std::sync::Arc;

use crate::alloc::AllocatorPtr;
use crate::error::{Result, RuntimeError};
use crate::provider::ExecutionProvider;
use crate::tensor::{DType, Shape, Tensor};

/// Dtype and allocator for one kernel output.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub dtype: DType,
    pub allocator: AllocatorPtr,
}

/// Per-invocation view a kernel computes against.
///
/// Inputs are shared handles into the execution frame. Outputs are allocated on demand from the
/// allocator chosen for each output and handed back to the frame after `compute` returns. Kernels
/// must not keep anything obtained here beyond the call.
pub struct OpKernelContext<'a> {
    provider: &'a dyn ExecutionProvider,
    inputs: Vec<Option<Arc<Tensor>>>,
    outputs: Vec<Option<Tensor>>,
    specs: Vec<OutputSpec>,
}

impl<'a> OpKernelContext<'a> {
    pub fn new(
        provider: &'a dyn ExecutionProvider,
        inputs: Vec<Option<Arc<Tensor>>>,
        specs: Vec<OutputSpec>,
    ) -> Self {
        let outputs = specs.iter().map(|_| None).collect();
        Self {
            provider,
            inputs,
            outputs,
            specs,
        }
    }

    /// Seeds output `index` with an existing tensor; `output` reuses it when the shape matches.
    pub fn with_output(mut self, index: usize, tensor: Tensor) -> Self {
        if let Some(slot) = self.outputs.get_mut(index) {
            *slot = Some(tensor);
        }
        self
    }

    pub fn provider(&self) -> &'a dyn ExecutionProvider {
        self.provider
    }

    pub fn execution_handle(&self) -> Option<&'a (dyn Any + Send + Sync)> {
        self.provider.execution_handle()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Required input `index`.
    pub fn input(&self, index: usize) -> Result<Arc<Tensor>> {
        self.optional_input(index)
            .ok_or_else(|| RuntimeError::MissingInput(format!("input {index}")))
    }

    /// Input `index`, or `None` when the node omitted it.
    pub fn optional_input(&self, index: usize) -> Option<Arc<Tensor>> {
        self.inputs.get(index).cloned().flatten()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Returns output `index` with storage for `shape`.
    ///
    /// The first call allocates; later calls with the same shape return the same tensor. Contents
    /// of a freshly obtained output are unspecified.
    pub fn output(&mut self, index: usize, shape: impl Into<Shape>) -> Result<&mut Tensor> {
        let shape = shape.into();
        let spec = self.specs.get(index).ok_or_else(|| {
            RuntimeError::usage(format!(
                "kernel requested output {index} but the node declares {}",
                self.specs.len()
            ))
        })?;
        let slot = &mut self.outputs[index];
        let reusable = matches!(
            slot,
            Some(tensor) if tensor.shape() == &shape && tensor.dtype() == spec.dtype && tensor.is_allocated()
        );
        if !reusable {
            *slot = Some(Tensor::allocate(spec.dtype, shape, &spec.allocator)?);
        }
        slot.as_mut()
            .ok_or_else(|| RuntimeError::usage(format!("output {index} has no storage")))
    }

    /// Hands the produced outputs back, in declaration order.
    pub fn into_outputs(self) -> Vec<Option<Tensor>> {
        self.outputs
    }
}
