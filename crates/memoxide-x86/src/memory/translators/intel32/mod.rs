//! Intel x86 32-bit (non-PAE) memory model.
//!
//! Two-level paging: CR3 -> Page Directory -> Page Table, with optional 4MB
//! pages at the directory level. All walks read page tables through a
//! [`PageTableSource`] and hold each snapshot only for the duration of one
//! lookup.
//!
//! - [`MmX86::tlb_spider`] - one-shot prefetch of a process's page tables
//! - [`MmX86::pte_map`] - merged region map of a process
//! - [`MmX86::virt2phys`] / [`MmX86::virt2phys_batch`] - translation
//! - [`MmX86::virt2phys_extended`] - per-page attributes
//! - [`MmX86::virt2phys_information`] - per-level diagnostic trace
//! - [`MmX86::phys2virt_information`] - reverse lookup

mod extended;
mod information;
mod pte_map;
pub mod pte;
mod spider;
mod virt2phys;

#[cfg(test)]
pub(crate) mod fixture;

use crate::memory::config::MmConfig;
use crate::memory::cache::PageTableRef;
use crate::memory::error::MmResult;
use crate::memory::model::MemoryModel;
use crate::memory::process::Process;
use crate::memory::traits::PageTableSource;
use crate::memory::types::{
    ExtendedEntry, MemoryModelType, PagingLevel, Phys2VirtInformation, PteMap,
    TranslationRequest, Virt2PhysInformation,
};
use std::sync::Arc;
use tracing::debug;

pub use pte::{DecodedPte, Pte};

/// The x86 32-bit memory model.
pub struct MmX86 {
    source: Arc<dyn PageTableSource>,
    config: MmConfig,
}

impl MmX86 {
    pub fn new(source: Arc<dyn PageTableSource>, config: MmConfig) -> Self {
        MmX86 { source, config }
    }

    pub fn config(&self) -> &MmConfig {
        &self.config
    }

    /// Fetch the page table containing `pa`.
    #[inline]
    fn page_table(&self, pa: u64) -> Option<PageTableRef> {
        self.source.page_table(pa & u64::from(pte::PTE_FRAME_MASK))
    }
}

impl MemoryModel for MmX86 {
    fn model_type(&self) -> MemoryModelType {
        MemoryModelType::X86
    }

    fn close(&self) {
        debug!("Closing x86 memory model");
    }

    fn virt2phys(
        &self,
        table_pa: u64,
        user_only: bool,
        level: Option<PagingLevel>,
        va: u64,
    ) -> MmResult<u64> {
        MmX86::virt2phys(self, table_pa, user_only, level.unwrap_or(PagingLevel::Directory), va)
    }

    fn virt2phys_batch(&self, dtb: u64, requests: &mut [TranslationRequest], user_only: bool) {
        MmX86::virt2phys_batch(self, dtb, requests, user_only)
    }

    fn virt2phys_extended(&self, dtb: u64, entries: &mut [ExtendedEntry]) {
        MmX86::virt2phys_extended(self, dtb, entries)
    }

    fn virt2phys_information(&self, process: &Process, va: u64) -> Virt2PhysInformation {
        MmX86::virt2phys_information(self, process, va)
    }

    fn phys2virt_information(&self, process: &Process, info: &mut Phys2VirtInformation) {
        MmX86::phys2virt_information(self, process, info)
    }

    fn pte_map(&self, process: &Process) -> Arc<PteMap> {
        MmX86::pte_map(self, process)
    }

    fn tlb_spider(&self, process: &Process) {
        MmX86::tlb_spider(self, process)
    }
}
