//! Diagnostic trace of one translation and physical to virtual lookup.

use super::pte::{Pte, MAX_ADDRESS_32};
use super::MmX86;
use crate::memory::cache::PageTable;
use crate::memory::process::Process;
use crate::memory::types::{MemoryModelType, PagingLevel, Phys2VirtInformation, Virt2PhysInformation};
use std::ops::ControlFlow;
use tracing::debug;

impl MmX86 {
    /// Record table address, index and raw entry at every level visited
    /// for `va`. Stops at the first level that does not lead further.
    pub fn virt2phys_information(&self, process: &Process, va: u64) -> Virt2PhysInformation {
        let mut info = Virt2PhysInformation::new(MemoryModelType::X86, va);
        if va <= MAX_ADDRESS_32 {
            self.information_walk(process, &mut info, PagingLevel::Directory, process.dtb());
        }
        info
    }

    fn information_walk(&self, process: &Process, info: &mut Virt2PhysInformation, level: PagingLevel, table_pa: u64) {
        let Some(table) = self.page_table(table_pa) else {
            return;
        };
        let slot = level.index_of(info.va);
        let pte = Pte(table.entry(slot));
        drop(table);

        let i = level.as_u8() as usize;
        info.pas[i] = table_pa;
        info.indices[i] = slot as u16;
        info.ptes[i] = pte.0;

        if !pte.is_present() || (process.user_only() && !pte.is_user()) {
            return;
        }
        match level {
            PagingLevel::Table => info.pas[0] = pte.frame(),
            PagingLevel::Directory if pte.is_large() => {
                if let Some(base) = pte.page_base(level) {
                    info.pas[0] = base;
                }
            }
            PagingLevel::Directory => self.information_walk(process, info, PagingLevel::Table, pte.frame()),
        }
    }

    /// Append to `info` every virtual address of `process` mapping the
    /// target physical address, until the result cap is reached.
    pub fn phys2virt_information(&self, process: &Process, info: &mut Phys2VirtInformation) {
        if info.is_full() || info.target() > self.config.max_physical_address {
            return;
        }
        self.tlb_spider(process);
        let Some(directory) = self.page_table(process.dtb()) else {
            return;
        };
        if self
            .phys2virt_walk(process, info, &directory, PagingLevel::Directory, 0)
            .is_break()
        {
            debug!(
                "Reverse lookup of {:#x} in pid {} stopped at {} results",
                info.target(),
                process.pid(),
                info.len()
            );
        }
    }

    /// Breaks as soon as the result list is full.
    fn phys2virt_walk(
        &self,
        process: &Process,
        info: &mut Phys2VirtInformation,
        table: &PageTable,
        level: PagingLevel,
        va_base: u64,
    ) -> ControlFlow<()> {
        let user_only = process.user_only();
        let offset_mask = level.offset_mask();
        for (index, &raw) in table.entries().iter().enumerate() {
            if info.is_full() {
                return ControlFlow::Break(());
            }
            let pte = Pte(raw);
            if !pte.is_present()
                || pte.target_base(level) > self.config.max_physical_address
                || (user_only && !pte.is_user())
            {
                continue;
            }
            let va = va_base + ((index as u64) << level.shift());

            if level == PagingLevel::Table || pte.is_large() {
                if pte.page_base(level) == Some(info.target() & !offset_mask) {
                    if !info.push(va | (info.target() & offset_mask)) {
                        return ControlFlow::Break(());
                    }
                }
                continue;
            }

            let Some(next) = self.page_table(pte.frame()) else {
                continue;
            };
            self.phys2virt_walk(process, info, &next, PagingLevel::Table, va)?;
        }
        ControlFlow::Continue(())
    }
}
