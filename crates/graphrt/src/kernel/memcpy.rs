use super::context::OpKernelContext;
use super::def::{ArgSelector, KernelDef};
use super::info::OpKernelInfo;
use super::registry::KernelRegistry;
use super::OpKernel;
use crate::alloc::MemKind;
use crate::error::Result;
use crate::tensor::DType;

/// Copies a host-resident value into the owning provider's device memory.
pub const MEMCPY_FROM_HOST: &str = "MemcpyFromHost";
/// Copies a device value into host-visible memory of the owning provider.
pub const MEMCPY_TO_HOST: &str = "MemcpyToHost";

pub fn is_memcpy_op(op_type: &str) -> bool {
    op_type == MEMCPY_FROM_HOST || op_type == MEMCPY_TO_HOST
}

/// Verbatim, shape- and dtype-preserving copy through the provider's `copy_tensor`.
#[derive(Debug, Default)]
pub struct MemcpyKernel;

impl OpKernel for MemcpyKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let src = ctx.input(0)?;
        let provider = ctx.provider();
        let dst = ctx.output(0, src.shape().clone())?;
        provider.copy_tensor(&src, dst)
    }
}

fn create_memcpy(_info: &OpKernelInfo) -> Result<Box<dyn OpKernel>> {
    Ok(Box::new(MemcpyKernel))
}

/// Registers both copy directions for `provider_type`.
///
/// Only providers whose default memory is not host memory need these.
pub fn register_memcpy_kernels(registry: &mut KernelRegistry, provider_type: &str) -> Result<()> {
    let args = [ArgSelector::Input(0), ArgSelector::Output(0)];
    registry.register(
        KernelDef::builder(MEMCPY_FROM_HOST, provider_type)
            .type_constraint("T", DType::ALL, args)
            .input_memory(0, MemKind::HostInput)
            .build(),
        create_memcpy,
    )?;
    registry.register(
        KernelDef::builder(MEMCPY_TO_HOST, provider_type)
            .type_constraint("T", DType::ALL, args)
            .output_memory(0, MemKind::HostOutput)
            .build(),
        create_memcpy,
    )?;
    Ok(())
}
