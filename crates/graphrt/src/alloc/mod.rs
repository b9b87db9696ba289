//! Per-device, per-memory-kind allocators.
//!
//! Every tensor buffer is owned by exactly one allocator and returns to it when dropped. Providers
//! register one allocator per [`MemKind`] they support in an [`AllocatorMap`]; the execution frame
//! picks the allocator named by a kernel's declared memory requirement for each output.

mod arena;
mod buffer;
mod host;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use arena::ArenaAllocator;
pub use buffer::{Block, Buffer};
pub use host::{host_allocator, HostAllocator};

/// Which class of memory an argument lives in, relative to the provider that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemKind {
    /// The provider's native memory.
    Default,
    /// Host memory a non-host provider reads inputs from.
    HostInput,
    /// Host-visible (pinned/staging) memory a non-host provider writes outputs to.
    HostOutput,
}

/// Physical location of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Accelerator(u16),
}

impl Device {
    pub fn is_host(self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Accelerator(id) => write!(f, "accel:{id}"),
        }
    }
}

/// Allocation strategy backing an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocatorKind {
    /// Every request goes straight to the device.
    Device,
    /// Freed blocks are cached and reused for later requests.
    Arena,
}

/// Describes where an allocator's memory lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub name: String,
    pub device: Device,
    pub mem_kind: MemKind,
    pub alloc_kind: AllocatorKind,
}

impl MemoryInfo {
    pub fn new(
        name: impl Into<String>,
        device: Device,
        mem_kind: MemKind,
        alloc_kind: AllocatorKind,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            mem_kind,
            alloc_kind,
        }
    }
}

/// Counters reported by an allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub bytes_in_use: usize,
    pub bytes_reserved: usize,
    pub peak_bytes_in_use: usize,
    pub num_allocs: usize,
    pub num_reuses: usize,
    pub num_frees: usize,
}

/// Allocator contract. Implementations serialise their own bookkeeping.
pub trait Allocator: Send + Sync + fmt::Debug {
    fn info(&self) -> &MemoryInfo;

    /// Hands out a block of at least `bytes` bytes. Contents are unspecified.
    fn alloc(&self, bytes: usize) -> Result<Block>;

    /// Returns a block previously produced by [`Allocator::alloc`].
    fn free(&self, block: Block);

    fn stats(&self) -> AllocatorStats;
}

/// Shared handle to an allocator.
pub type AllocatorPtr = Arc<dyn Allocator>;

/// Memory kind → allocator table owned by a provider.
#[derive(Debug, Clone, Default)]
pub struct AllocatorMap {
    allocators: BTreeMap<MemKind, AllocatorPtr>,
}

impl AllocatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an allocator; the first registration for a kind wins.
    pub fn insert(&mut self, mem_kind: MemKind, allocator: AllocatorPtr) {
        self.allocators.entry(mem_kind).or_insert(allocator);
    }

    pub fn get(&self, mem_kind: MemKind) -> Option<AllocatorPtr> {
        self.allocators.get(&mem_kind).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MemKind, &AllocatorPtr)> {
        self.allocators.iter().map(|(kind, alloc)| (*kind, alloc))
    }

    pub fn len(&self) -> usize {
        self.allocators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }
}
