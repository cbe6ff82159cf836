use crate::abi::{PAGE_SIZE, STR_ARRAY_HANDLE_OFFSET, STR_ARRAY_STRIDE};
use crate::error::{HostError, HostResult};
use crate::memory::{read_i32, zero_fill, LinearMemory};
use crate::strings::StringPool;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArrayBlock {
    pub ptr: u32,
    pub size: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub alloc_count: usize,
    pub reuse_count: usize,
    pub pages_grown: u64,
    pub bytes_in_use: usize,
    pub peak_bytes_in_use: usize,
}

/// Bump allocator over linear memory with best-fit reuse of freed blocks.
///
/// New blocks are always carved from freshly grown pages at the old end of
/// memory, so they never overlap static data or each other. Freed blocks are
/// kept ordered by `(size, ptr)`; adjacent free blocks are not coalesced.
#[derive(Debug, Default)]
pub struct ArrayArena {
    allocations: HashMap<u32, u32>,
    free: BTreeSet<(u32, u32)>,
    stats: ArenaStats,
    strict_free: bool,
    max_pages: Option<u64>,
}

impl ArrayArena {
    pub fn new(strict_free: bool, max_pages: Option<u64>) -> Self {
        Self {
            strict_free,
            max_pages,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.allocations.clear();
        self.free.clear();
        self.stats = ArenaStats::default();
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// Returns a zeroed block of at least `size` bytes; 0 for an empty request.
    pub fn create(&mut self, memory: &mut dyn LinearMemory, size: u32) -> HostResult<u32> {
        if size == 0 {
            return Ok(0);
        }
        if let Some(&(block_size, ptr)) = self.free.range((size, 0)..).next() {
            self.free.remove(&(block_size, ptr));
            zero_fill(memory, ptr, size)?;
            self.track(ptr, size);
            self.stats.reuse_count += 1;
            return Ok(ptr);
        }

        let old_size = memory.size();
        let ptr = u32::try_from(old_size).map_err(|_| HostError::OutOfMemory { requested: size })?;
        let pages = size.div_ceil(PAGE_SIZE) as u64;
        if let Some(max) = self.max_pages {
            let current = old_size as u64 / PAGE_SIZE as u64;
            if current + pages > max {
                return Err(HostError::OutOfMemory { requested: size });
            }
        }
        memory
            .grow(pages)
            .map_err(|_| HostError::OutOfMemory { requested: size })?;
        zero_fill(memory, ptr, size)?;
        self.stats.pages_grown += pages;
        debug!(ptr, size, pages, "array arena grew memory");
        self.track(ptr, size);
        Ok(ptr)
    }

    fn track(&mut self, ptr: u32, size: u32) {
        self.allocations.insert(ptr, size);
        self.stats.alloc_count += 1;
        self.stats.bytes_in_use += size as usize;
        self.stats.peak_bytes_in_use = self.stats.peak_bytes_in_use.max(self.stats.bytes_in_use);
    }

    pub fn destroy(&mut self, ptr: u32) -> HostResult<()> {
        if ptr == 0 {
            return Ok(());
        }
        match self.allocations.remove(&ptr) {
            Some(size) => {
                self.free.insert((size, ptr));
                self.stats.bytes_in_use = self.stats.bytes_in_use.saturating_sub(size as usize);
                Ok(())
            }
            None if self.strict_free => Err(HostError::InvalidFree(ptr)),
            None => {
                warn!(ptr, "ignoring destroy of unallocated array block");
                Ok(())
            }
        }
    }

    /// Releases the string reference held in every stride of the block, then
    /// destroys the block itself.
    pub fn destroy_string_array(
        &mut self,
        memory: &dyn LinearMemory,
        pool: &mut StringPool,
        ptr: u32,
        total_bytes: u32,
    ) -> HostResult<()> {
        if ptr == 0 {
            return Ok(());
        }
        let slots = total_bytes / STR_ARRAY_STRIDE;
        for index in 0..slots {
            let slot = ptr
                .checked_add(index * STR_ARRAY_STRIDE + STR_ARRAY_HANDLE_OFFSET)
                .ok_or(HostError::OutOfBounds {
                    addr: ptr,
                    len: total_bytes,
                    size: memory.size(),
                })?;
            let raw = read_i32(memory, slot)?;
            pool.release_ref(raw as i64)?;
        }
        self.destroy(ptr)
    }

    pub fn block_size(&self, ptr: u32) -> Option<u32> {
        self.allocations.get(&ptr).copied()
    }

    pub fn live_blocks(&self) -> Vec<ArrayBlock> {
        let mut blocks = self
            .allocations
            .iter()
            .map(|(&ptr, &size)| ArrayBlock { ptr, size })
            .collect::<Vec<_>>();
        blocks.sort();
        blocks
    }

    pub fn free_blocks(&self) -> Vec<ArrayBlock> {
        self.free
            .iter()
            .map(|&(size, ptr)| ArrayBlock { ptr, size })
            .collect()
    }
}
