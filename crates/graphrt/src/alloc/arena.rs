use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, RuntimeError};

use super::{Allocator, AllocatorKind, AllocatorStats, Block, Device, MemKind, MemoryInfo};

/// Blocks larger than this multiple of the request are not reused for it.
const MAX_REUSE_SLACK: usize = 2;

/// Arena-style allocator that caches freed blocks and reuses them best-fit.
///
/// Reserved memory only returns to the device on [`ArenaAllocator::shrink`] or when the arena is
/// dropped, so steady-state runs over the same graph stop touching the device allocator.
#[derive(Debug)]
pub struct ArenaAllocator {
    info: MemoryInfo,
    limit: Option<usize>,
    state: Mutex<ArenaState>,
}

#[derive(Debug, Default)]
struct ArenaState {
    free: BTreeMap<usize, Vec<Block>>,
    free_bytes: usize,
    stats: AllocatorStats,
}

impl ArenaAllocator {
    pub fn new(name: impl Into<String>, device: Device, mem_kind: MemKind) -> Self {
        Self {
            info: MemoryInfo::new(name, device, mem_kind, AllocatorKind::Arena),
            limit: None,
            state: Mutex::new(ArenaState::default()),
        }
    }

    /// Caps the total bytes the arena may reserve from the device.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Drops every cached free block, returning its memory to the device.
    pub fn shrink(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        shrink_locked(&mut state)
    }
}

fn shrink_locked(state: &mut ArenaState) -> usize {
    let released = state.free_bytes;
    state.free.clear();
    state.free_bytes = 0;
    state.stats.bytes_reserved -= released;
    released
}

impl Allocator for ArenaAllocator {
    fn info(&self) -> &MemoryInfo {
        &self.info
    }

    fn alloc(&self, bytes: usize) -> Result<Block> {
        let capacity = bytes.div_ceil(8) * 8;
        let mut state = self.state.lock().map_err(|_| {
            RuntimeError::device(self.info.name.clone(), "arena allocator mutex poisoned")
        })?;

        let upper = capacity.max(8) * MAX_REUSE_SLACK;
        let reusable = state
            .free
            .range(capacity..=upper)
            .next()
            .map(|(size, _)| *size);
        if let Some(size) = reusable {
            let bucket = state.free.get_mut(&size);
            if let Some(block) = bucket.and_then(|blocks| blocks.pop()) {
                if state.free.get(&size).is_some_and(|blocks| blocks.is_empty()) {
                    state.free.remove(&size);
                }
                state.free_bytes -= block.capacity();
                state.stats.num_allocs += 1;
                state.stats.num_reuses += 1;
                state.stats.bytes_in_use += block.capacity();
                state.stats.peak_bytes_in_use =
                    state.stats.peak_bytes_in_use.max(state.stats.bytes_in_use);
                return Ok(block);
            }
        }

        if let Some(limit) = self.limit {
            if state.stats.bytes_reserved + capacity > limit && state.free_bytes > 0 {
                let released = shrink_locked(&mut state);
                tracing::debug!(
                    allocator = %self.info.name,
                    released,
                    "arena released cached blocks to satisfy request"
                );
            }
            if state.stats.bytes_reserved + capacity > limit {
                return Err(RuntimeError::AllocationExhausted {
                    allocator: self.info.name.clone(),
                    requested: bytes,
                    available: limit.saturating_sub(state.stats.bytes_reserved),
                });
            }
        }

        let block = Block::zeroed(capacity);
        state.stats.num_allocs += 1;
        state.stats.bytes_reserved += block.capacity();
        state.stats.bytes_in_use += block.capacity();
        state.stats.peak_bytes_in_use = state.stats.peak_bytes_in_use.max(state.stats.bytes_in_use);
        Ok(block)
    }

    fn free(&self, block: Block) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = block.capacity();
        state.stats.num_frees += 1;
        state.stats.bytes_in_use -= capacity;
        state.free_bytes += capacity;
        state.free.entry(capacity).or_default().push(block);
    }

    fn stats(&self) -> AllocatorStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }
}
