//! Single and batch virtual to physical translation.

use super::pte::{leaf_address, Pte, MAX_ADDRESS_32};
use super::MmX86;
use crate::memory::cache::PageTableRef;
use crate::memory::error::{MmError, MmResult};
use crate::memory::types::{PagingLevel, TranslationRequest};
use std::collections::HashMap;

/// Outcome of consulting one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Step {
    /// Final physical address.
    Physical(u64),
    /// Continue in the page table at this address.
    NextTable(u64),
}

/// Classify the entry found for `va` at `level`.
pub(super) fn classify(pte: Pte, user_only: bool, level: PagingLevel, va: u64) -> MmResult<Step> {
    if !pte.is_present() {
        return Err(MmError::PageNotPresent {
            address: va,
            level: level.as_u8(),
            entry: pte.0,
        });
    }
    if user_only && !pte.is_user() {
        return Err(MmError::SupervisorPage {
            address: va,
            level: level.as_u8(),
            entry: pte.0,
        });
    }
    if level == PagingLevel::Directory && !pte.is_large() {
        return Ok(Step::NextTable(pte.frame()));
    }
    leaf_address(pte, level, va)
        .map(Step::Physical)
        .ok_or(MmError::ReservedBits { address: va, entry: pte.0 })
}

impl MmX86 {
    /// Translate `va` starting at the table `table_pa` of `level`.
    ///
    /// A non-present leaf fails with [`MmError::PageNotPresent`] carrying
    /// the raw entry, so callers can look at paged-out encodings.
    pub fn virt2phys(&self, table_pa: u64, user_only: bool, level: PagingLevel, va: u64) -> MmResult<u64> {
        if va > MAX_ADDRESS_32 {
            return Err(MmError::AddressOutOfRange { address: va });
        }
        if table_pa > MAX_ADDRESS_32 {
            return Err(MmError::AddressOutOfRange { address: table_pa });
        }
        let table = self
            .page_table(table_pa)
            .ok_or(MmError::TableUnavailable { table: table_pa & !0xfff })?;
        let pte = Pte(table.entry(level.index_of(va)));
        drop(table);

        match classify(pte, user_only, level, va)? {
            Step::Physical(pa) => Ok(pa),
            Step::NextTable(next) => self.virt2phys(next, user_only, PagingLevel::Table, va),
        }
    }

    /// Translate every request in place, sharing table fetches.
    ///
    /// The directory pass resolves 4MB pages and records the page table of
    /// every other request; the table pass then resolves those together.
    /// Requests already holding a physical address are left untouched.
    pub fn virt2phys_batch(&self, dtb: u64, requests: &mut [TranslationRequest], user_only: bool) {
        self.batch_pass(dtb, requests, user_only, PagingLevel::Directory);
    }

    fn batch_pass(&self, dtb: u64, requests: &mut [TranslationRequest], user_only: bool, level: PagingLevel) {
        let table_of = |request: &TranslationRequest| -> Option<u64> {
            if request.resolved || request.va > MAX_ADDRESS_32 {
                return None;
            }
            match level {
                PagingLevel::Directory if dtb <= MAX_ADDRESS_32 => Some(dtb & !0xfff),
                PagingLevel::Directory => None,
                PagingLevel::Table => request.pending_table,
            }
        };

        let mut wanted: Vec<u64> = requests.iter().filter_map(table_of).collect();
        wanted.sort_unstable();
        wanted.dedup();
        if level == PagingLevel::Table {
            self.source.prefetch(&wanted);
        }
        let tables: HashMap<u64, PageTableRef> = wanted
            .into_iter()
            .filter_map(|pa| self.page_table(pa).map(|table| (pa, table)))
            .collect();

        let mut pending = false;
        for request in requests.iter_mut() {
            let table = table_of(&*request).and_then(|pa| tables.get(&pa));
            request.pending_table = None;
            let Some(table) = table else {
                continue;
            };
            let pte = Pte(table.entry(level.index_of(request.va)));
            match classify(pte, user_only, level, request.va) {
                Ok(Step::Physical(pa)) => {
                    request.pa = pa;
                    request.pte = pte.0;
                    request.resolved = true;
                }
                Ok(Step::NextTable(next)) => {
                    request.pending_table = Some(next);
                    pending = true;
                }
                Err(MmError::PageNotPresent { .. }) if level == PagingLevel::Table => {
                    request.pte = pte.0;
                    request.paging = true;
                }
                Err(_) => {}
            }
        }
        drop(tables);

        if pending && level == PagingLevel::Directory {
            self.batch_pass(dtb, requests, user_only, PagingLevel::Table);
        }
    }
}
