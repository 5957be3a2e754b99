//! Page table cache.
//!
//! Read-through LRU cache of 4KB page table pages keyed by their aligned
//! physical address. Lookups hand out reference-counted snapshots
//! ([`PageTableRef`]); a snapshot stays valid after eviction and is released
//! when the last handle drops.

use crate::memory::traits::{MemoryLayer, PageTableSource};
use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Entries per 32-bit page table page.
pub const PAGE_TABLE_ENTRIES: usize = 1024;

/// Size of a page table page.
pub const PAGE_TABLE_SIZE: usize = PAGE_TABLE_ENTRIES * 4;

const PAGE_OFFSET_MASK: u64 = 0xfff;

/// Immutable snapshot of one page table page.
#[derive(Debug)]
pub struct PageTable {
    pa: u64,
    entries: Box<[u32; PAGE_TABLE_ENTRIES]>,
}

/// Shared handle to a cached page table.
pub type PageTableRef = Arc<PageTable>;

impl PageTable {
    /// Decode a page table from little-endian bytes. Needs a full page.
    pub fn from_bytes(pa: u64, bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PAGE_TABLE_SIZE {
            return None;
        }
        let mut entries = Box::new([0u32; PAGE_TABLE_ENTRIES]);
        for (slot, chunk) in entries.iter_mut().zip(bytes.chunks_exact(4)) {
            *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(PageTable { pa, entries })
    }

    /// Physical address of this table.
    pub fn pa(&self) -> u64 {
        self.pa
    }

    /// Raw entry at `index` (only the low 10 bits are used).
    #[inline]
    pub fn entry(&self, index: usize) -> u32 {
        self.entries[index & (PAGE_TABLE_ENTRIES - 1)]
    }

    /// All 1024 raw entries.
    pub fn entries(&self) -> &[u32; PAGE_TABLE_ENTRIES] {
        &self.entries
    }
}

/// LRU page table cache over a physical memory layer.
///
/// # Thread Safety
///
/// The LRU is guarded by a `parking_lot::Mutex`; reads of the underlying
/// layer happen outside of the lock.
pub struct PageTableCache {
    layer: Arc<dyn MemoryLayer>,
    tables: Mutex<LruCache<u64, Option<PageTableRef>>>,
}

impl PageTableCache {
    /// Create a cache holding up to `capacity` page tables.
    pub fn new(layer: Arc<dyn MemoryLayer>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        PageTableCache {
            layer,
            tables: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Read a table straight from the layer.
    fn read_table(&self, pa: u64) -> Option<PageTableRef> {
        match self.layer.read(pa, PAGE_TABLE_SIZE) {
            Ok(bytes) => PageTable::from_bytes(pa, &bytes).map(Arc::new),
            Err(e) => {
                trace!("Page table {:#x} unreadable: {}", pa, e);
                None
            }
        }
    }

    /// Whether `pa` has a cache slot (present or known-absent).
    pub fn is_cached(&self, pa: u64) -> bool {
        self.tables.lock().contains(&(pa & !PAGE_OFFSET_MASK))
    }

    /// Number of cached slots.
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageTableSource for PageTableCache {
    fn page_table(&self, pa: u64) -> Option<PageTableRef> {
        let pa = pa & !PAGE_OFFSET_MASK;
        {
            let mut cache = self.tables.lock();
            if let Some(cached) = cache.get(&pa) {
                return cached.clone();
            }
        }

        let table = self.read_table(pa);
        self.tables.lock().put(pa, table.clone());
        table
    }

    fn prefetch(&self, pas: &[u64]) {
        let mut missing: Vec<u64> = {
            let cache = self.tables.lock();
            pas.iter()
                .map(|pa| pa & !PAGE_OFFSET_MASK)
                .filter(|pa| !cache.contains(pa))
                .collect()
        };
        missing.sort_unstable();
        missing.dedup();
        if missing.is_empty() {
            return;
        }

        let tables: Vec<(u64, Option<PageTableRef>)> = missing
            .par_iter()
            .map(|&pa| (pa, self.read_table(pa)))
            .collect();

        let mut cache = self.tables.lock();
        let mut loaded = 0usize;
        for (pa, table) in tables {
            loaded += usize::from(table.is_some());
            cache.put(pa, table);
        }
        debug!(
            "Prefetched {} of {} page tables ({} requested)",
            loaded,
            missing.len(),
            pas.len()
        );
    }
}
