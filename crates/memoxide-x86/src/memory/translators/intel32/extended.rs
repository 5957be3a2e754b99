//! Extended-attributes translation of ordered page runs.

use super::pte::{leaf_address, Pte, MAX_ADDRESS_32};
use super::MmX86;
use crate::memory::types::{AttributeFlags, ExtendedEntry, PagingLevel};

fn attribute_flags(pte: Pte) -> AttributeFlags {
    let mut flags = AttributeFlags::HARDWARE;
    if pte.is_writable() {
        flags |= AttributeFlags::WRITE;
    }
    if !pte.is_user() {
        flags |= AttributeFlags::KERNEL;
    }
    AttributeFlags(flags)
}

impl MmX86 {
    /// Resolve physical address and attributes of every entry in place.
    ///
    /// Only user-accessible mappings resolve. The raw entry and level of the
    /// last table consulted are recorded for every entry. Consecutive pages
    /// inside one page table are resolved from the same table snapshot.
    pub fn virt2phys_extended(&self, dtb: u64, entries: &mut [ExtendedEntry]) {
        let mut index = 0;
        while index < entries.len() {
            self.extended_walk(dtb, entries, PagingLevel::Directory, &mut index);
        }
    }

    /// Resolve `entries[*index]` (and the run of consecutive pages after it
    /// at the table level) through `table_pa`. Always advances `*index`.
    fn extended_walk(&self, table_pa: u64, entries: &mut [ExtendedEntry], level: PagingLevel, index: &mut usize) {
        let table = if entries[*index].va > MAX_ADDRESS_32 || table_pa > MAX_ADDRESS_32 {
            None
        } else {
            self.page_table(table_pa)
        };
        let Some(table) = table else {
            let entry = &mut entries[*index];
            entry.pa = 0;
            entry.flags = AttributeFlags::default();
            *index += 1;
            return;
        };

        loop {
            let current = *index;
            let entry = &mut entries[current];
            let slot = level.index_of(entry.va);
            let pte = Pte(table.entry(slot));
            entry.pa = 0;
            entry.flags = AttributeFlags::default();
            entry.pte = pte.0;
            entry.level = Some(level);

            if pte.is_present() && pte.is_user() {
                if level == PagingLevel::Directory && !pte.is_large() {
                    drop(table);
                    self.extended_walk(pte.frame(), entries, PagingLevel::Table, index);
                    return;
                }
                if let Some(pa) = leaf_address(pte, level, entry.va) {
                    entry.pa = pa;
                    entry.flags = attribute_flags(pte);
                }
            }

            *index += 1;
            let next_in_table = level == PagingLevel::Table
                && slot < 0x3ff
                && *index < entries.len()
                && entries[current].va + 0x1000 == entries[*index].va;
            if !next_in_table {
                return;
            }
        }
    }
}
