//! Execution provider abstraction.
//!
//! A provider owns one device's allocators and kernel catalog and knows how to move tensor bytes
//! between its memory and host memory. The engine core never names concrete providers; sessions
//! receive them already constructed and keep them in registration (priority) order.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::alloc::{AllocatorMap, AllocatorPtr, MemKind};
use crate::error::{Result, RuntimeError};
use crate::kernel::KernelRegistry;
use crate::tensor::Tensor;

/// Device capability set the engine dispatches through.
pub trait ExecutionProvider: Send + Sync + fmt::Debug {
    /// Unique provider type string, e.g. `"CPUExecutionProvider"`.
    fn provider_type(&self) -> &str;

    /// Every allocator this provider registered, keyed by memory kind.
    fn allocators(&self) -> &AllocatorMap;

    /// Returns the allocator registered for `mem_kind`, if any.
    fn allocator(&self, mem_kind: MemKind) -> Option<AllocatorPtr> {
        self.allocators().get(mem_kind)
    }

    /// The provider-type kernel catalog. The same registry instance is handed to every session.
    fn kernel_registry(&self) -> Arc<KernelRegistry>;

    /// Synchronously copies `src` into the already allocated `dst`.
    ///
    /// Implementations must reject dtype or shape disagreement instead of truncating.
    fn copy_tensor(&self, src: &Tensor, dst: &mut Tensor) -> Result<()>;

    /// Number of execution queues the provider exposes. Queue `0` always exists.
    fn queue_count(&self) -> usize {
        1
    }

    /// Copies on a specific execution queue.
    ///
    /// The default accepts only queue `0`; any other id is a contract violation.
    fn copy_tensor_on_queue(&self, src: &Tensor, dst: &mut Tensor, queue_id: usize) -> Result<()> {
        if queue_id != 0 {
            return Err(RuntimeError::InvalidQueue {
                provider: self.provider_type().to_string(),
                queue_id,
                queue_count: self.queue_count(),
            });
        }
        self.copy_tensor(src, dst)
    }

    /// Backend-specific handle that only this provider's kernels interpret.
    fn execution_handle(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }

    /// Blocks until all work previously submitted to this provider has completed.
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Called before the first node of a run is dispatched.
    fn on_run_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called once every node of a run has been issued. Device work may still be in flight.
    fn on_run_end(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a registered provider.
pub type ProviderPtr = Arc<dyn ExecutionProvider>;

/// Ordered set of providers attached to a session. Index order is priority order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionProviders {
    providers: Vec<ProviderPtr>,
}

impl ExecutionProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider with the lowest priority so far. Provider types must be unique.
    pub fn add(&mut self, provider: ProviderPtr) -> Result<()> {
        let provider_type = provider.provider_type();
        if self.get(provider_type).is_some() {
            return Err(RuntimeError::usage(format!(
                "execution provider {provider_type} is already registered"
            )));
        }
        if provider.allocator(MemKind::Default).is_none() {
            return Err(RuntimeError::usage(format!(
                "execution provider {provider_type} has no default allocator"
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, provider_type: &str) -> Option<&ProviderPtr> {
        self.providers
            .iter()
            .find(|provider| provider.provider_type() == provider_type)
    }

    /// Like [`ExecutionProviders::get`] but reports an unknown type as a usage error.
    pub fn require(&self, provider_type: &str) -> Result<&ProviderPtr> {
        self.get(provider_type).ok_or_else(|| {
            RuntimeError::usage(format!(
                "execution provider {provider_type} is not registered with this session"
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderPtr> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
