//! Sparse in-memory physical layer.
//!
//! Holds physical memory as a set of 4KB pages. Pages that were never
//! written are absent and fail reads, which is how an incomplete dump
//! looks to the page-table cache.

use crate::memory::error::{MmError, MmResult};
use crate::memory::traits::MemoryLayer;
use parking_lot::RwLock;
use std::collections::HashMap;

const PAGE_SIZE: u64 = 0x1000;
const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

type Page = Box<[u8; PAGE_SIZE as usize]>;

/// Sparse physical memory made of 4KB pages.
pub struct BufferLayer {
    name: String,
    maximum_address: u64,
    pages: RwLock<HashMap<u64, Page>>,
}

impl BufferLayer {
    /// Create an empty layer spanning `[0, maximum_address]`.
    pub fn new(name: impl Into<String>, maximum_address: u64) -> Self {
        BufferLayer {
            name: name.into(),
            maximum_address,
            pages: RwLock::new(HashMap::new()),
        }
    }

    /// Make the page containing `pa` present (zero filled if new).
    pub fn map_page(&self, pa: u64) {
        self.pages
            .write()
            .entry(pa & !PAGE_OFFSET_MASK)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE as usize]));
    }

    /// Drop the page containing `pa`, as if it were missing from the dump.
    pub fn unmap_page(&self, pa: u64) {
        self.pages.write().remove(&(pa & !PAGE_OFFSET_MASK));
    }

    /// Write a little-endian `u32` at `pa`, mapping its page if needed.
    pub fn write_u32(&self, pa: u64, value: u32) -> MmResult<()> {
        let offset = (pa & PAGE_OFFSET_MASK) as usize;
        if pa > self.maximum_address || offset + 4 > PAGE_SIZE as usize {
            return Err(MmError::invalid_address(&self.name, pa, "Write outside of the layer"));
        }
        let mut pages = self.pages.write();
        let page = pages
            .entry(pa & !PAGE_OFFSET_MASK)
            .or_insert_with(|| Box::new([0u8; PAGE_SIZE as usize]));
        page[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Number of present pages.
    pub fn page_count(&self) -> usize {
        self.pages.read().len()
    }
}

impl MemoryLayer for BufferLayer {
    fn read(&self, offset: u64, length: usize) -> MmResult<Vec<u8>> {
        if !self.is_valid(offset, length as u64) {
            return Err(MmError::invalid_address(&self.name, offset, "Page not present in layer"));
        }
        let pages = self.pages.read();
        let mut output = Vec::with_capacity(length);
        let mut current = offset;
        let end = offset + length as u64;
        while current < end {
            let page = &pages[&(current & !PAGE_OFFSET_MASK)];
            let start = (current & PAGE_OFFSET_MASK) as usize;
            let chunk = (PAGE_SIZE as usize - start).min((end - current) as usize);
            output.extend_from_slice(&page[start..start + chunk]);
            current += chunk as u64;
        }
        Ok(output)
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return false;
        }
        let last = match offset.checked_add(length - 1) {
            Some(last) if last <= self.maximum_address => last,
            _ => return false,
        };
        let pages = self.pages.read();
        let mut page = offset & !PAGE_OFFSET_MASK;
        while page <= last {
            if !pages.contains_key(&page) {
                return false;
            }
            page += PAGE_SIZE;
        }
        true
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        self.maximum_address
    }
}
