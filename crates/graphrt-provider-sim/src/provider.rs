use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use graphrt::alloc::{AllocatorMap, ArenaAllocator, Device, HostAllocator, MemKind};
use graphrt::error::{Result, RuntimeError};
use graphrt::kernel::register_memcpy_kernels;
use graphrt::tensor::copy_tensor_data;
use graphrt::{ExecutionProvider, KernelRegistry, Tensor};
use graphrt_provider_cpu::register_cpu_kernels;
use once_cell::sync::OnceCell;

pub const SIM_PROVIDER: &str = "SimExecutionProvider";

const DEFAULT_QUEUES: usize = 2;

static SIM_REGISTRY: OnceCell<Arc<KernelRegistry>> = OnceCell::new();

/// Memcpy kernels plus the CPU numeric kernels, keyed under [`SIM_PROVIDER`].
pub fn sim_kernel_registry() -> Result<Arc<KernelRegistry>> {
    SIM_REGISTRY
        .get_or_try_init(|| {
            let mut registry = KernelRegistry::new();
            register_memcpy_kernels(&mut registry, SIM_PROVIDER)?;
            register_cpu_kernels(&mut registry, SIM_PROVIDER)?;
            tracing::debug!(kernels = registry.len(), "built sim kernel registry");
            Ok(Arc::new(registry))
        })
        .cloned()
}

/// Handle exposed through `execution_handle`; kernels may downcast to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimDevice {
    pub ordinal: u16,
}

/// Activity counters since the provider was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub copies: usize,
    pub pending: usize,
    pub syncs: usize,
    pub runs_started: usize,
    pub runs_ended: usize,
}

#[derive(Debug)]
pub struct SimExecutionProvider {
    device: SimDevice,
    allocators: AllocatorMap,
    registry: Arc<KernelRegistry>,
    // Copies issued per queue that no `sync` has retired yet.
    pending: Vec<AtomicUsize>,
    copies: AtomicUsize,
    syncs: AtomicUsize,
    runs_started: AtomicUsize,
    runs_ended: AtomicUsize,
}

impl SimExecutionProvider {
    pub fn new() -> Result<Self> {
        Self::with_queues(0, DEFAULT_QUEUES)
    }

    /// Emulates device `ordinal` with `queues` execution queues.
    pub fn with_queues(ordinal: u16, queues: usize) -> Result<Self> {
        if queues == 0 {
            return Err(RuntimeError::usage(
                "a provider needs at least one execution queue",
            ));
        }
        let device = Device::Accelerator(ordinal);
        let mut allocators = AllocatorMap::new();
        allocators.insert(
            MemKind::Default,
            Arc::new(ArenaAllocator::new(
                format!("Sim{ordinal}"),
                device,
                MemKind::Default,
            )),
        );
        allocators.insert(
            MemKind::HostOutput,
            Arc::new(ArenaAllocator::new(
                format!("Sim{ordinal}Pinned"),
                Device::Cpu,
                MemKind::HostOutput,
            )),
        );
        allocators.insert(
            MemKind::HostInput,
            Arc::new(HostAllocator::new(
                format!("Sim{ordinal}HostInput"),
                MemKind::HostInput,
            )),
        );
        Ok(Self {
            device: SimDevice { ordinal },
            allocators,
            registry: sim_kernel_registry()?,
            pending: (0..queues).map(|_| AtomicUsize::new(0)).collect(),
            copies: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
            runs_started: AtomicUsize::new(0),
            runs_ended: AtomicUsize::new(0),
        })
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            copies: self.copies.load(Ordering::Relaxed),
            pending: self.pending_copies(),
            syncs: self.syncs.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_ended: self.runs_ended.load(Ordering::Relaxed),
        }
    }

    pub fn pending_copies(&self) -> usize {
        self.pending
            .iter()
            .map(|count| count.load(Ordering::Acquire))
            .sum()
    }
}

impl ExecutionProvider for SimExecutionProvider {
    fn provider_type(&self) -> &str {
        SIM_PROVIDER
    }

    fn allocators(&self) -> &AllocatorMap {
        &self.allocators
    }

    fn kernel_registry(&self) -> Arc<KernelRegistry> {
        Arc::clone(&self.registry)
    }

    fn copy_tensor(&self, src: &Tensor, dst: &mut Tensor) -> Result<()> {
        self.copy_tensor_on_queue(src, dst, 0)
    }

    fn queue_count(&self) -> usize {
        self.pending.len()
    }

    fn copy_tensor_on_queue(&self, src: &Tensor, dst: &mut Tensor, queue_id: usize) -> Result<()> {
        let pending = self.pending.get(queue_id).ok_or_else(|| RuntimeError::InvalidQueue {
            provider: SIM_PROVIDER.to_string(),
            queue_id,
            queue_count: self.pending.len(),
        })?;
        copy_tensor_data(src, dst)?;
        pending.fetch_add(1, Ordering::AcqRel);
        self.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn execution_handle(&self) -> Option<&(dyn Any + Send + Sync)> {
        Some(&self.device)
    }

    fn sync(&self) -> Result<()> {
        let retired: usize = self
            .pending
            .iter()
            .map(|count| count.swap(0, Ordering::AcqRel))
            .sum();
        self.syncs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(device = self.device.ordinal, retired, "sim sync");
        Ok(())
    }

    fn on_run_start(&self) -> Result<()> {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_run_end(&self) -> Result<()> {
        self.runs_ended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
