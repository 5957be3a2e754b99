//! Test fixture: page tables laid out in a sparse physical layer.

use super::MmX86;
use crate::memory::cache::{PageTableCache, PageTableRef};
use crate::memory::config::MmConfig;
use crate::memory::layers::BufferLayer;
use crate::memory::traits::{MemoryLayer, PageTableSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Page directory base used by every fixture.
pub(crate) const DTB: u64 = 0x0010_0000;

/// Page tables for directory slot `n` live at `TABLE_POOL + n * 0x1000`.
pub(crate) const TABLE_POOL: u64 = 0x0020_0000;

/// Highest physical address of the fixture layer.
pub(crate) const MAX_PA: u64 = 0x0fff_ffff;

pub(crate) struct Fixture {
    layer: Arc<BufferLayer>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let layer = Arc::new(BufferLayer::new("physical", MAX_PA));
        layer.map_page(DTB);
        Fixture { layer }
    }

    pub(crate) fn layer(&self) -> &Arc<BufferLayer> {
        &self.layer
    }

    pub(crate) fn pde(&self, index: usize) -> u32 {
        let bytes = self.layer.read(DTB + index as u64 * 4, 4).unwrap();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub(crate) fn set_pde(&self, index: usize, value: u32) {
        self.layer.write_u32(DTB + index as u64 * 4, value).unwrap();
    }

    pub(crate) fn set_pte(&self, table: u64, index: usize, value: u32) {
        self.layer.write_u32(table + index as u64 * 4, value).unwrap();
    }

    pub(crate) fn table_for(dir_index: usize) -> u64 {
        TABLE_POOL + ((dir_index as u64) << 12)
    }

    /// Point directory slot `dir_index` at its pool table with `flags`.
    pub(crate) fn map_table(&self, dir_index: usize, flags: u32) -> u64 {
        let table = Self::table_for(dir_index);
        self.layer.map_page(table);
        self.set_pde(dir_index, table as u32 | flags);
        table
    }

    /// Map the 4KB page at `va` to `pa`. Creates a user/writable table if
    /// the directory slot is empty.
    pub(crate) fn map_4k(&self, va: u64, pa: u64, flags: u32) {
        let dir_index = (va >> 22) as usize & 0x3ff;
        if self.pde(dir_index) == 0 {
            self.map_table(dir_index, 0x7);
        }
        let table = Self::table_for(dir_index);
        self.set_pte(table, (va >> 12) as usize & 0x3ff, pa as u32 | flags);
    }

    /// Map the 4MB page at `va` to `pa` (both 4MB aligned).
    pub(crate) fn map_4m(&self, va: u64, pa: u64, flags: u32) {
        self.set_pde((va >> 22) as usize & 0x3ff, pa as u32 | flags | 0x81);
    }

    pub(crate) fn config(&self) -> MmConfig {
        MmConfig {
            max_physical_address: MAX_PA,
            ..MmConfig::default()
        }
    }

    pub(crate) fn cache(&self) -> Arc<PageTableCache> {
        Arc::new(PageTableCache::new(self.layer.clone(), 64))
    }

    pub(crate) fn model(&self) -> MmX86 {
        self.model_with(self.config())
    }

    pub(crate) fn model_with(&self, config: MmConfig) -> MmX86 {
        MmX86::new(self.cache(), config)
    }

    /// A model whose page table fetches are counted.
    pub(crate) fn counting(&self) -> (MmX86, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            inner: PageTableCache::new(self.layer.clone(), 64),
            fetches: Mutex::new(HashMap::new()),
            prefetches: Mutex::new(Vec::new()),
        });
        (MmX86::new(source.clone(), self.config()), source)
    }
}

/// Page table source recording every fetch and prefetch.
pub(crate) struct CountingSource {
    inner: PageTableCache,
    fetches: Mutex<HashMap<u64, usize>>,
    prefetches: Mutex<Vec<Vec<u64>>>,
}

impl CountingSource {
    pub(crate) fn fetches_of(&self, pa: u64) -> usize {
        self.fetches.lock().get(&pa).copied().unwrap_or(0)
    }

    pub(crate) fn prefetches(&self) -> Vec<Vec<u64>> {
        self.prefetches.lock().clone()
    }

    pub(crate) fn cache(&self) -> &PageTableCache {
        &self.inner
    }
}

impl PageTableSource for CountingSource {
    fn page_table(&self, pa: u64) -> Option<PageTableRef> {
        *self.fetches.lock().entry(pa).or_insert(0) += 1;
        self.inner.page_table(pa)
    }

    fn prefetch(&self, pas: &[u64]) {
        self.prefetches.lock().push(pas.to_vec());
        self.inner.prefetch(pas);
    }
}
