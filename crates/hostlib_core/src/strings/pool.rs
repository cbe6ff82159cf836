use crate::error::{HostError, HostResult};
use tracing::trace;

const SLOT_BITS: u32 = 20;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;
const GENERATION_MASK: u32 = (1 << (31 - SLOT_BITS)) - 1;
pub const MAX_LIVE_STRINGS: usize = 1 << SLOT_BITS;

/// A raw string argument, classified by the sign of its low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrRef {
    /// Null-terminated UTF-8 in linear memory.
    Addr(u32),
    /// Entry in the string pool.
    Handle(i32),
}

impl StrRef {
    pub fn classify(raw: i64) -> Self {
        let low = raw as i32;
        if low < 0 {
            StrRef::Handle(low)
        } else {
            StrRef::Addr(low as u32)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub value: String,
    pub refcount: i64,
    symbols: Option<Vec<usize>>,
}

impl PoolEntry {
    fn new(value: String) -> Self {
        Self {
            value,
            refcount: 1,
            symbols: None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<PoolEntry>,
}

/// Refcounted string storage addressed by negative generational handles.
#[derive(Debug, Default)]
pub struct StringPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn insert(&mut self, value: String) -> HostResult<i32> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.slots.len() >= MAX_LIVE_STRINGS {
                    return Err(HostError::PoolExhausted(self.live));
                }
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.entry = Some(PoolEntry::new(value));
        self.live += 1;
        let handle = encode(slot, entry.generation);
        trace!(handle, live = self.live, "string pool insert");
        Ok(handle)
    }

    pub fn get(&self, handle: i32) -> HostResult<&PoolEntry> {
        let (slot, generation) = decode(handle);
        self.slots
            .get(slot as usize)
            .filter(|entry| entry.generation == generation)
            .and_then(|entry| entry.entry.as_ref())
            .ok_or(HostError::StaleHandle(handle))
    }

    fn get_mut(&mut self, handle: i32) -> HostResult<&mut PoolEntry> {
        let (slot, generation) = decode(handle);
        self.slots
            .get_mut(slot as usize)
            .filter(|entry| entry.generation == generation)
            .and_then(|entry| entry.entry.as_mut())
            .ok_or(HostError::StaleHandle(handle))
    }

    pub fn value(&self, handle: i32) -> HostResult<&str> {
        Ok(&self.get(handle)?.value)
    }

    pub fn retain(&mut self, handle: i32) -> HostResult<()> {
        self.get_mut(handle)?.refcount += 1;
        Ok(())
    }

    /// Drops one reference; returns `true` when the entry was deleted.
    /// A slot whose generation is used up is retired, never reused.
    pub fn release(&mut self, handle: i32) -> HostResult<bool> {
        let entry = self.get_mut(handle)?;
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Ok(false);
        }
        let (slot, _) = decode(handle);
        let slot_entry = &mut self.slots[slot as usize];
        slot_entry.entry = None;
        if slot_entry.generation < GENERATION_MASK {
            slot_entry.generation += 1;
            self.free.push(slot);
        } else {
            trace!(slot, "string pool slot retired");
        }
        self.live -= 1;
        trace!(handle, live = self.live, "string pool delete");
        Ok(true)
    }

    /// Value and byte offset of every symbol; the offsets are computed on
    /// first use and cached with the entry.
    pub fn symbols(&mut self, handle: i32) -> HostResult<(&str, &[usize])> {
        let entry = self.get_mut(handle)?;
        if entry.symbols.is_none() {
            entry.symbols = Some(symbol_offsets(&entry.value));
        }
        let offsets = entry.symbols.as_deref().unwrap_or(&[]);
        Ok((&entry.value, offsets))
    }
}

pub fn symbol_offsets(text: &str) -> Vec<usize> {
    text.char_indices().map(|(offset, _)| offset).collect()
}

fn encode(slot: u32, generation: u32) -> i32 {
    let key = ((generation & GENERATION_MASK) << SLOT_BITS) | slot;
    -(key as i32) - 1
}

fn decode(handle: i32) -> (u32, u32) {
    let key = (-(handle as i64) - 1) as u32;
    (key & SLOT_MASK, key >> SLOT_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_sign_of_low_bits() {
        assert_eq!(StrRef::classify(0), StrRef::Addr(0));
        assert_eq!(StrRef::classify(1024), StrRef::Addr(1024));
        assert_eq!(StrRef::classify(-1), StrRef::Handle(-1));
        assert_eq!(StrRef::classify(0xFFFF_FFFF), StrRef::Handle(-1));
        assert_eq!(StrRef::classify(0x7_0000_0010), StrRef::Addr(0x10));
    }

    #[test]
    fn handles_are_negative() {
        let mut pool = StringPool::new();
        for idx in 0..8 {
            let handle = pool.insert(format!("s{idx}")).unwrap();
            assert!(handle < 0);
        }
        assert_eq!(pool.live(), 8);
    }

    #[test]
    fn encode_decode_extremes() {
        assert_eq!(decode(encode(0, 0)), (0, 0));
        assert_eq!(encode(0, 0), -1);
        let handle = encode(SLOT_MASK, GENERATION_MASK);
        assert_eq!(handle, i32::MIN);
        assert_eq!(decode(handle), (SLOT_MASK, GENERATION_MASK));
    }

    #[test]
    fn refcount_deletes_at_zero() {
        let mut pool = StringPool::new();
        let handle = pool.insert("abc".to_string()).unwrap();
        pool.retain(handle).unwrap();
        assert!(!pool.release(handle).unwrap());
        assert_eq!(pool.value(handle).unwrap(), "abc");
        assert!(pool.release(handle).unwrap());
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.value(handle), Err(HostError::StaleHandle(handle)));
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let mut pool = StringPool::new();
        let old = pool.insert("old".to_string()).unwrap();
        pool.release(old).unwrap();
        let new = pool.insert("new".to_string()).unwrap();
        assert_ne!(old, new);
        assert_eq!(decode(old).0, decode(new).0);
        assert_eq!(pool.value(new).unwrap(), "new");
        assert!(pool.retain(old).is_err());
        assert!(pool.release(old).is_err());
    }

    #[test]
    fn exhausted_slot_is_retired_not_recycled() {
        let mut pool = StringPool::new();
        let old = pool.insert("old".to_string()).unwrap();
        pool.release(old).unwrap();
        for _ in 0..GENERATION_MASK {
            let temp = pool.insert("temp".to_string()).unwrap();
            assert_eq!(decode(temp).0, 0);
            pool.release(temp).unwrap();
        }
        let fresh = pool.insert("secret".to_string()).unwrap();
        assert_ne!(fresh, old);
        assert_eq!(decode(fresh).0, 1);
        assert_eq!(pool.value(old), Err(HostError::StaleHandle(old)));
        assert_eq!(pool.value(fresh).unwrap(), "secret");
        assert_eq!(pool.live(), 1);
    }

    #[test]
    fn unknown_handle_is_stale() {
        let pool = StringPool::new();
        assert_eq!(pool.get(-5).unwrap_err(), HostError::StaleHandle(-5));
    }

    #[test]
    fn symbol_offsets_are_cached_per_entry() {
        let mut pool = StringPool::new();
        let handle = pool.insert("aж😀b".to_string()).unwrap();
        let (value, offsets) = pool.symbols(handle).unwrap();
        assert_eq!(value, "aж😀b");
        assert_eq!(offsets, &[0, 1, 3, 7]);
        assert!(pool.get(handle).unwrap().symbols.is_some());
    }

    #[test]
    fn clear_resets_everything() {
        let mut pool = StringPool::new();
        let handle = pool.insert("x".to_string()).unwrap();
        pool.clear();
        assert_eq!(pool.live(), 0);
        assert!(pool.value(handle).is_err());
    }
}
