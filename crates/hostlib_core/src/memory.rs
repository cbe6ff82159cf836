use crate::abi::PAGE_SIZE;
use crate::error::{HostError, HostResult};

/// Byte-level view of a module's linear memory.
///
/// Implementations hand out a fresh slice on every call. Growth may move the
/// backing buffer, so callers must not hold a slice across `grow`.
pub trait LinearMemory {
    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// Grows by `pages` whole pages and returns the previous size in pages.
    fn grow(&mut self, pages: u64) -> HostResult<u64>;

    fn size(&self) -> usize {
        self.bytes().len()
    }
}

/// Growable memory backed by a `Vec`, used when no engine owns the buffer.
#[derive(Debug, Clone, Default)]
pub struct VecMemory {
    data: Vec<u8>,
    max_pages: Option<u64>,
}

impl VecMemory {
    pub fn new(pages: u32) -> Self {
        Self {
            data: vec![0; pages as usize * PAGE_SIZE as usize],
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn pages(&self) -> u64 {
        (self.data.len() / PAGE_SIZE as usize) as u64
    }
}

impl LinearMemory for VecMemory {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn grow(&mut self, pages: u64) -> HostResult<u64> {
        let previous = self.pages();
        let requested = pages.saturating_mul(PAGE_SIZE as u64);
        let over_limit = self
            .max_pages
            .is_some_and(|max| previous.saturating_add(pages) > max);
        if over_limit || requested > u32::MAX as u64 {
            return Err(HostError::OutOfMemory {
                requested: requested.min(u32::MAX as u64) as u32,
            });
        }
        let new_len = self.data.len() + requested as usize;
        self.data.resize(new_len, 0);
        Ok(previous)
    }
}

/// Reads a null-terminated UTF-8 string. Reads starting past the end yield
/// an empty string; a missing terminator stops at the end of memory.
pub fn read_cstr(memory: &dyn LinearMemory, addr: u32) -> String {
    let data = memory.bytes();
    let start = addr as usize;
    if start >= data.len() {
        return String::new();
    }
    let end = data[start..]
        .iter()
        .position(|byte| *byte == 0)
        .map(|offset| start + offset)
        .unwrap_or(data.len());
    String::from_utf8_lossy(&data[start..end]).into_owned()
}

pub fn read_i32(memory: &dyn LinearMemory, addr: u32) -> HostResult<i32> {
    let bytes = slice(memory, addr, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u8(memory: &mut dyn LinearMemory, addr: u32, value: u8) -> HostResult<()> {
    let range = checked_range(memory.size(), addr, 1)?;
    memory.bytes_mut()[range][0] = value;
    Ok(())
}

pub fn write_bytes(memory: &mut dyn LinearMemory, addr: u32, bytes: &[u8]) -> HostResult<()> {
    let range = checked_range(memory.size(), addr, bytes.len() as u32)?;
    memory.bytes_mut()[range].copy_from_slice(bytes);
    Ok(())
}

pub fn zero_fill(memory: &mut dyn LinearMemory, addr: u32, len: u32) -> HostResult<()> {
    let range = checked_range(memory.size(), addr, len)?;
    memory.bytes_mut()[range].fill(0);
    Ok(())
}

fn slice(memory: &dyn LinearMemory, addr: u32, len: u32) -> HostResult<&[u8]> {
    let range = checked_range(memory.size(), addr, len)?;
    Ok(&memory.bytes()[range])
}

fn checked_range(size: usize, addr: u32, len: u32) -> HostResult<std::ops::Range<usize>> {
    let start = addr as usize;
    let end = start.saturating_add(len as usize);
    if end > size {
        return Err(HostError::OutOfBounds { addr, len, size });
    }
    Ok(start..end)
}

/// Tracks which memory instance the runtime state belongs to. Every bind
/// starts a new generation; state from an earlier generation is meaningless.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBinding {
    generation: u64,
    bound_size: Option<usize>,
}

impl MemoryBinding {
    pub fn bind(&mut self, memory: &dyn LinearMemory) -> u64 {
        self.generation += 1;
        self.bound_size = Some(memory.size());
        self.generation
    }

    pub fn is_bound(&self) -> bool {
        self.bound_size.is_some()
    }

    pub fn ensure_bound(&self) -> HostResult<()> {
        if self.is_bound() {
            Ok(())
        } else {
            Err(HostError::Unbound)
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bound_size(&self) -> Option<usize> {
        self.bound_size
    }
}
