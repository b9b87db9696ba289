use std::fmt;

use crate::error::Result;

use super::AllocatorPtr;

/// Raw storage unit handed out by allocators.
///
/// Storage is word-backed so typed views of every supported dtype are correctly aligned.
pub struct Block {
    words: Box<[u64]>,
}

impl Block {
    /// Creates a zero-filled block large enough for `bytes` bytes.
    pub fn zeroed(bytes: usize) -> Self {
        Self {
            words: vec![0u64; bytes.div_ceil(8)].into_boxed_slice(),
        }
    }

    /// Usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// A contiguous byte buffer owned by exactly one allocator.
///
/// Dropping the buffer returns its block to the owning allocator.
pub struct Buffer {
    block: Option<Block>,
    len: usize,
    allocator: AllocatorPtr,
}

impl Buffer {
    pub fn allocate(allocator: &AllocatorPtr, len: usize) -> Result<Self> {
        let block = allocator.alloc(len)?;
        debug_assert!(block.capacity() >= len);
        Ok(Self {
            block: Some(block),
            len,
            allocator: AllocatorPtr::clone(allocator),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn allocator(&self) -> &AllocatorPtr {
        &self.allocator
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.block {
            Some(block) => &block.bytes()[..self.len],
            None => &[],
        }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        match &mut self.block {
            Some(block) => &mut block.bytes_mut()[..len],
            None => &mut [],
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.allocator.free(block);
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("allocator", &self.allocator.info().name)
            .finish()
    }
}
