use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::error::{Result, RuntimeError};

use super::{
    Allocator, AllocatorKind, AllocatorPtr, AllocatorStats, Block, Device, MemKind, MemoryInfo,
};

/// Plain host allocator: every request is a fresh zeroed block, every free releases it.
#[derive(Debug)]
pub struct HostAllocator {
    info: MemoryInfo,
    stats: Mutex<AllocatorStats>,
}

impl HostAllocator {
    pub fn new(name: impl Into<String>, mem_kind: MemKind) -> Self {
        Self {
            info: MemoryInfo::new(name, Device::Cpu, mem_kind, AllocatorKind::Device),
            stats: Mutex::new(AllocatorStats::default()),
        }
    }
}

impl Allocator for HostAllocator {
    fn info(&self) -> &MemoryInfo {
        &self.info
    }

    fn alloc(&self, bytes: usize) -> Result<Block> {
        let mut stats = self.stats.lock().map_err(|_| {
            RuntimeError::device(self.info.name.clone(), "host allocator mutex poisoned")
        })?;
        let block = Block::zeroed(bytes);
        stats.num_allocs += 1;
        stats.bytes_in_use += block.capacity();
        stats.bytes_reserved += block.capacity();
        stats.peak_bytes_in_use = stats.peak_bytes_in_use.max(stats.bytes_in_use);
        Ok(block)
    }

    fn free(&self, block: Block) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.num_frees += 1;
        stats.bytes_in_use -= block.capacity();
        stats.bytes_reserved -= block.capacity();
    }

    fn stats(&self) -> AllocatorStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static HOST_ALLOCATOR: Lazy<AllocatorPtr> =
    Lazy::new(|| Arc::new(HostAllocator::new("Host", MemKind::Default)));

/// Process-wide host allocator backing tensors created by callers.
pub fn host_allocator() -> AllocatorPtr {
    AllocatorPtr::clone(&HOST_ALLOCATOR)
}
