use hostlib_core::{HostError, HostResult, LinearMemory};
use wasmtime::{AsContext, AsContextMut, Memory};

/// Linear memory seen through a store or caller. The byte slice is looked
/// up again on every access, so growth inside a host call is safe.
pub(crate) struct StoreMemory<'a, C> {
    store: &'a mut C,
    memory: Option<Memory>,
}

impl<'a, C: AsContextMut> StoreMemory<'a, C> {
    pub(crate) fn new(store: &'a mut C, memory: Option<Memory>) -> Self {
        Self { store, memory }
    }
}

impl<C: AsContextMut> LinearMemory for StoreMemory<'_, C> {
    fn bytes(&self) -> &[u8] {
        match self.memory {
            Some(memory) => memory.data(self.store.as_context()),
            None => &[],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self.memory {
            Some(memory) => memory.data_mut(self.store.as_context_mut()),
            None => &mut [],
        }
    }

    fn grow(&mut self, pages: u64) -> HostResult<u64> {
        let requested = pages
            .saturating_mul(hostlib_core::abi::PAGE_SIZE as u64)
            .min(u32::MAX as u64) as u32;
        let memory = self.memory.ok_or(HostError::OutOfMemory { requested })?;
        memory
            .grow(self.store.as_context_mut(), pages)
            .map_err(|_| HostError::OutOfMemory { requested })
    }

    fn size(&self) -> usize {
        match self.memory {
            Some(memory) => memory.data_size(self.store.as_context()),
            None => 0,
        }
    }
}
