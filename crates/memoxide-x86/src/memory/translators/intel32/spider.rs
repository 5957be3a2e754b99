//! TLB spider: one-shot page table prefetch for a process.

use super::pte::Pte;
use super::MmX86;
use crate::memory::process::Process;
use tracing::debug;

impl MmX86 {
    /// Prefetch every page table the process directory points at.
    ///
    /// Runs once per process. If the directory itself is unavailable the
    /// process stays unspidered so a later call can retry.
    pub fn tlb_spider(&self, process: &Process) {
        process.tlb_spider_once(|| self.spider_directory(process));
    }

    /// Returns `false` when the directory could not be read.
    fn spider_directory(&self, process: &Process) -> bool {
        let Some(directory) = self.page_table(process.dtb()) else {
            debug!("TLB spider: page directory {:#x} unavailable", process.dtb());
            return false;
        };

        let user_only = process.user_only();
        let mut tables: Vec<u64> = directory
            .entries()
            .iter()
            .map(|&raw| Pte(raw))
            .filter(|pde| pde.is_present() && !pde.is_large())
            .filter(|pde| !user_only || pde.is_user())
            .map(Pte::frame)
            .collect();
        drop(directory);
        tables.sort_unstable();
        tables.dedup();

        debug!(
            "TLB spider: pid {} prefetching {} page tables",
            process.pid(),
            tables.len()
        );
        self.source.prefetch(&tables);
        true
    }
}
