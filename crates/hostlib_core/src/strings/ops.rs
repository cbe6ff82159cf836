use super::numeric;
use super::pool::{symbol_offsets, StrRef, StringPool};
use crate::abi::{addr, MAX_CODEPOINT};
use crate::error::HostResult;
use crate::memory::{read_cstr, write_u8, LinearMemory};
use std::borrow::Cow;
use std::cmp::Ordering;

// String operations as seen by compiled code. Every position is a 1-based
// symbol (code point) index, and every string argument may be either a pool
// handle or the address of a C string.
impl StringPool {
    /// Logical value of a string reference.
    pub fn read<'a>(&'a self, memory: &dyn LinearMemory, raw: i64) -> HostResult<Cow<'a, str>> {
        match StrRef::classify(raw) {
            StrRef::Handle(handle) => Ok(Cow::Borrowed(self.value(handle)?)),
            StrRef::Addr(address) => Ok(Cow::Owned(read_cstr(memory, address))),
        }
    }

    fn with_symbols<R>(
        &mut self,
        memory: &dyn LinearMemory,
        raw: i64,
        f: impl FnOnce(&str, &[usize]) -> R,
    ) -> HostResult<R> {
        match StrRef::classify(raw) {
            StrRef::Handle(handle) => {
                let (text, offsets) = self.symbols(handle)?;
                Ok(f(text, offsets))
            }
            StrRef::Addr(address) => {
                let text = read_cstr(memory, address);
                let offsets = symbol_offsets(&text);
                Ok(f(&text, &offsets))
            }
        }
    }

    fn alloc(&mut self, value: String) -> HostResult<i64> {
        self.insert(value).map(i64::from)
    }

    pub fn from_literal(&mut self, memory: &dyn LinearMemory, raw: i64) -> HostResult<i64> {
        let text = read_cstr(memory, addr(raw));
        self.alloc(text)
    }

    pub fn retain_ref(&mut self, raw: i64) -> HostResult<()> {
        match StrRef::classify(raw) {
            StrRef::Handle(handle) => self.retain(handle),
            StrRef::Addr(_) => Ok(()),
        }
    }

    pub fn release_ref(&mut self, raw: i64) -> HostResult<()> {
        match StrRef::classify(raw) {
            StrRef::Handle(handle) => self.release(handle).map(|_| ()),
            StrRef::Addr(_) => Ok(()),
        }
    }

    pub fn concat(&mut self, memory: &dyn LinearMemory, a: i64, b: i64) -> HostResult<i64> {
        let mut joined = self.read(memory, a)?.into_owned();
        joined.push_str(&self.read(memory, b)?);
        self.alloc(joined)
    }

    /// Symbols `start..=end` (1-based, inclusive), clamped to the string.
    pub fn slice(
        &mut self,
        memory: &dyn LinearMemory,
        raw: i64,
        start: i64,
        end: i64,
    ) -> HostResult<i64> {
        let piece = self.with_symbols(memory, raw, |text, offsets| {
            let len = offsets.len() as i64;
            let first = start.saturating_sub(1).clamp(0, len);
            let last = end.saturating_sub(1).clamp(-1, len - 1);
            if first > last {
                return String::new();
            }
            let from = offsets[first as usize];
            let to = offsets
                .get(last as usize + 1)
                .copied()
                .unwrap_or(text.len());
            text[from..to].to_string()
        })?;
        self.alloc(piece)
    }

    pub fn compare(&self, memory: &dyn LinearMemory, a: i64, b: i64) -> HostResult<i64> {
        let left = self.read(memory, a)?;
        let right = self.read(memory, b)?;
        Ok(match left.as_ref().cmp(right.as_ref()) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })
    }

    pub fn length(&mut self, memory: &dyn LinearMemory, raw: i64) -> HostResult<i64> {
        self.with_symbols(memory, raw, |_, offsets| offsets.len() as i64)
    }

    /// Code point at 1-based `pos`, or -1 when out of range.
    pub fn symbol_at(&mut self, memory: &dyn LinearMemory, raw: i64, pos: i64) -> HostResult<i64> {
        self.with_symbols(memory, raw, |text, offsets| {
            if pos < 1 || pos > offsets.len() as i64 {
                return -1;
            }
            text[offsets[(pos - 1) as usize]..]
                .chars()
                .next()
                .map(|ch| ch as i64)
                .unwrap_or(-1)
        })
    }

    /// Code point of the first symbol, 0 for an empty string.
    pub fn unicode(&self, memory: &dyn LinearMemory, raw: i64) -> HostResult<i64> {
        Ok(self
            .read(memory, raw)?
            .chars()
            .next()
            .map(|ch| ch as i64)
            .unwrap_or(0))
    }

    pub fn from_codepoint(&mut self, codepoint: i64) -> HostResult<i64> {
        let text = symbol_from_codepoint(codepoint)
            .map(String::from)
            .unwrap_or_default();
        self.alloc(text)
    }

    /// 1-based symbol position of the first occurrence of `needle`, 0 if absent.
    pub fn index_of(&mut self, memory: &dyn LinearMemory, haystack: i64, needle: i64) -> HostResult<i64> {
        self.index_of_from(memory, 1, haystack, needle)
    }

    /// Like [`StringPool::index_of`], searching from symbol `start`. A start
    /// more than one past the last symbol finds nothing, even an empty needle.
    pub fn index_of_from(
        &mut self,
        memory: &dyn LinearMemory,
        start: i64,
        haystack: i64,
        needle: i64,
    ) -> HostResult<i64> {
        if start < 1 {
            return Ok(0);
        }
        let needle = self.read(memory, needle)?.into_owned();
        self.with_symbols(memory, haystack, |text, offsets| {
            let skip = usize::try_from(start - 1).unwrap_or(usize::MAX);
            if skip > offsets.len() {
                return 0;
            }
            let from = offsets.get(skip).copied().unwrap_or(text.len());
            match text[from..].find(needle.as_str()) {
                Some(found) => {
                    let byte = from + found;
                    offsets.partition_point(|offset| *offset < byte) as i64 + 1
                }
                None => 0,
            }
        })
    }

    pub fn from_double(&mut self, value: f64) -> HostResult<i64> {
        self.alloc(numeric::format_significant(value))
    }

    pub fn from_int(&mut self, value: i64) -> HostResult<i64> {
        self.alloc(value.to_string())
    }

    /// Parses a float, writing a 1-byte success flag to `ok_addr`.
    pub fn to_double(&self, memory: &mut dyn LinearMemory, raw: i64, ok_addr: i64) -> HostResult<f64> {
        let parsed = numeric::parse_double(&self.read(&*memory, raw)?);
        write_u8(memory, addr(ok_addr), parsed.is_some() as u8)?;
        Ok(parsed.unwrap_or(0.0))
    }

    /// Parses an integer, writing a 1-byte success flag to `ok_addr`.
    pub fn to_int(&self, memory: &mut dyn LinearMemory, raw: i64, ok_addr: i64) -> HostResult<i64> {
        let parsed = numeric::parse_int(&self.read(&*memory, raw)?);
        write_u8(memory, addr(ok_addr), parsed.is_some() as u8)?;
        Ok(parsed.unwrap_or(0))
    }

    /// New string with the symbol at `pos` replaced. An out-of-range position
    /// or invalid code point hands back the original reference, retained when
    /// it is a handle.
    pub fn replace_symbol(
        &mut self,
        memory: &dyn LinearMemory,
        raw: i64,
        codepoint: i64,
        pos: i64,
    ) -> HostResult<i64> {
        let replacement = symbol_from_codepoint(codepoint);
        let replaced = self.with_symbols(memory, raw, |text, offsets| {
            let symbol = replacement?;
            if pos < 1 || pos > offsets.len() as i64 {
                return None;
            }
            let idx = (pos - 1) as usize;
            let from = offsets[idx];
            let to = offsets.get(idx + 1).copied().unwrap_or(text.len());
            let mut out = String::with_capacity(text.len() + 4);
            out.push_str(&text[..from]);
            out.push(symbol);
            out.push_str(&text[to..]);
            Some(out)
        })?;
        match replaced {
            Some(text) => self.alloc(text),
            None => {
                self.retain_ref(raw)?;
                Ok(raw)
            }
        }
    }
}

pub fn symbol_from_codepoint(codepoint: i64) -> Option<char> {
    if !(0..=MAX_CODEPOINT).contains(&codepoint) {
        return None;
    }
    char::from_u32(codepoint as u32)
}
