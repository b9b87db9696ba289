use std::sync::Arc;

use graphrt::alloc::{AllocatorMap, ArenaAllocator, Device, MemKind};
use graphrt::error::Result;
use graphrt::tensor::copy_tensor_data;
use graphrt::{ExecutionProvider, KernelRegistry, Tensor};
use once_cell::sync::OnceCell;

use crate::kernels::register_cpu_kernels;

pub const CPU_PROVIDER: &str = "CPUExecutionProvider";

static CPU_REGISTRY: OnceCell<Arc<KernelRegistry>> = OnceCell::new();

/// The kernel registry shared by every [`CpuExecutionProvider`] built with
/// [`CpuExecutionProvider::new`]. Built on first use.
pub fn cpu_kernel_registry() -> Result<Arc<KernelRegistry>> {
    CPU_REGISTRY
        .get_or_try_init(|| {
            let mut registry = KernelRegistry::new();
            register_cpu_kernels(&mut registry, CPU_PROVIDER)?;
            tracing::debug!(kernels = registry.len(), "built cpu kernel registry");
            Ok(Arc::new(registry))
        })
        .cloned()
}

/// Runs kernels on the calling thread against host memory from an arena.
#[derive(Debug)]
pub struct CpuExecutionProvider {
    allocators: AllocatorMap,
    registry: Arc<KernelRegistry>,
}

impl CpuExecutionProvider {
    pub fn new() -> Result<Self> {
        Ok(Self::with_registry(cpu_kernel_registry()?))
    }

    /// Uses a caller-built registry instead of the shared one.
    pub fn with_registry(registry: Arc<KernelRegistry>) -> Self {
        Self::with_arena(
            ArenaAllocator::new("Cpu", Device::Cpu, MemKind::Default),
            registry,
        )
    }

    /// Uses `arena` as the default allocator, e.g. one with a byte limit.
    pub fn with_arena(arena: ArenaAllocator, registry: Arc<KernelRegistry>) -> Self {
        let mut allocators = AllocatorMap::new();
        allocators.insert(MemKind::Default, Arc::new(arena));
        Self {
            allocators,
            registry,
        }
    }
}

impl ExecutionProvider for CpuExecutionProvider {
    fn provider_type(&self) -> &str {
        CPU_PROVIDER
    }

    fn allocators(&self) -> &AllocatorMap {
        &self.allocators
    }

    fn kernel_registry(&self) -> Arc<KernelRegistry> {
        Arc::clone(&self.registry)
    }

    fn copy_tensor(&self, src: &Tensor, dst: &mut Tensor) -> Result<()> {
        copy_tensor_data(src, dst)
    }
}
