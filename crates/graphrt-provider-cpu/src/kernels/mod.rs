//! Float32 CPU kernels.

mod activation;
mod elementwise;
mod gemm;
mod movement;

use graphrt::error::Result;
use graphrt::kernel::{ArgSelector, KernelDef, KernelDefBuilder, KernelRegistry};
use graphrt::DType;

/// Adds a family of kernels to `registry` under the given provider type.
pub type KernelRegistrar = fn(&mut KernelRegistry, &str) -> Result<()>;

#[linkme::distributed_slice]
pub static CPU_KERNEL_REGISTRARS: [KernelRegistrar] = [..];

/// Registers every CPU kernel under `provider_type`.
pub fn register_cpu_kernels(registry: &mut KernelRegistry, provider_type: &str) -> Result<()> {
    for register in CPU_KERNEL_REGISTRARS.iter() {
        register(registry, provider_type)?;
    }
    tracing::debug!(
        provider = provider_type,
        families = CPU_KERNEL_REGISTRARS.len(),
        kernels = registry.len(),
        "registered cpu kernels"
    );
    Ok(())
}

/// Opset-1 kernel whose inputs and outputs are all float32.
pub(crate) fn float_kernel(op_type: &str, provider_type: &str) -> KernelDefBuilder {
    KernelDef::builder(op_type, provider_type)
        .since_version(1)
        .type_constraint(
            "T",
            [DType::F32],
            [ArgSelector::AllInputs, ArgSelector::AllOutputs],
        )
}
