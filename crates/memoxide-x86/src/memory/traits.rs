//! Core traits for abstracting memory access.
//!
//! [`MemoryLayer`] abstracts the raw physical memory source (mmap'd dump,
//! sparse buffer). [`PageTableSource`] is the page-table cache seam the
//! memory model walks through.

use crate::memory::cache::PageTableRef;
use crate::memory::error::MmResult;

/// Trait for reading from a physical memory layer.
pub trait MemoryLayer: Send + Sync {
    /// Read `length` bytes starting at `offset`.
    fn read(&self, offset: u64, length: usize) -> MmResult<Vec<u8>>;

    /// Check if the address range `[offset, offset+length)` is valid.
    fn is_valid(&self, offset: u64, length: u64) -> bool;

    /// The name of this layer.
    fn name(&self) -> &str;

    /// Maximum valid address in this layer.
    fn maximum_address(&self) -> u64;
}

/// Supplier of page table snapshots.
///
/// Implementations must be safe to call from several threads at once.
pub trait PageTableSource: Send + Sync {
    /// Fetch the 4KB page table at `pa` (the low 12 bits are ignored).
    ///
    /// Returns `None` when the page is unavailable. The snapshot is released
    /// when the returned handle is dropped.
    fn page_table(&self, pa: u64) -> Option<PageTableRef>;

    /// Bring a set of page tables into the source ahead of use.
    fn prefetch(&self, pas: &[u64]);
}
