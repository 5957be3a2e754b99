//! Region map builder.
//!
//! Walks the directory and every table below it depth first, merging leaf
//! pages into runs of identical flags. Unreadable tables are skipped.

use super::pte::DecodedPte;
use super::MmX86;
use crate::memory::cache::PageTable;
use crate::memory::process::Process;
use crate::memory::types::{MemoryRegion, PageFlags, PagingLevel, PteMap};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::debug;

struct MapBuilder<'a> {
    mm: &'a MmX86,
    user_only: bool,
    regions: Vec<MemoryRegion>,
}

impl MmX86 {
    /// Region map of `process`, built on first use and memoized.
    pub fn pte_map(&self, process: &Process) -> Arc<PteMap> {
        process.pte_map_or_build(|| self.build_pte_map(process))
    }

    fn build_pte_map(&self, process: &Process) -> PteMap {
        self.tlb_spider(process);
        let mut builder = MapBuilder {
            mm: self,
            user_only: process.user_only(),
            regions: Vec::new(),
        };
        match self.page_table(process.dtb()) {
            Some(directory) => {
                if builder.walk(&directory, PagingLevel::Directory, 0, false).is_break() {
                    debug!(
                        "PTE map of pid {} truncated at {} regions",
                        process.pid(),
                        builder.regions.len()
                    );
                }
            }
            None => debug!("PTE map: page directory {:#x} unavailable", process.dtb()),
        }
        debug!(
            "PTE map of pid {}: {} regions",
            process.pid(),
            builder.regions.len()
        );
        PteMap::new(builder.regions)
    }
}

impl MapBuilder<'_> {
    /// Walk one table. `supervisor` is set below a directory entry without
    /// the user bit. Breaks once the region cap is hit.
    fn walk(&mut self, table: &PageTable, level: PagingLevel, va_base: u64, supervisor: bool) -> ControlFlow<()> {
        let mm = self.mm;
        let config = &mm.config;
        for (index, &raw) in table.entries().iter().enumerate() {
            let decoded = DecodedPte::decode(raw, level, config.transition_heuristic);
            let Some(mut pte) = decoded.pte() else {
                continue;
            };
            let paged_out = decoded.is_guessed();
            if pte.target_base(level) > config.max_physical_address {
                continue;
            }
            if supervisor {
                pte = pte.without_user();
            }
            if self.user_only && !pte.is_user() {
                continue;
            }
            let va = va_base + ((index as u64) << level.shift());

            if level == PagingLevel::Table || pte.is_large() {
                if pte.page_base(level).is_none() {
                    continue;
                }
                self.push_page(va, level, PageFlags::from_pte(pte.0), paged_out)?;
                continue;
            }

            let Some(next) = mm.page_table(pte.frame()) else {
                continue;
            };
            self.walk(&next, PagingLevel::Table, va, !pte.is_user())?;
        }
        ControlFlow::Continue(())
    }

    fn push_page(&mut self, va: u64, level: PagingLevel, flags: PageFlags, paged_out: bool) -> ControlFlow<()> {
        let pages = level.page_count();
        let paged_out_pages = if paged_out { pages as u32 } else { 0 };

        if let Some(last) = self.regions.last_mut() {
            // A guessed page joins a contiguous run whatever its flags.
            if (last.flags == flags || paged_out) && last.va_end() == va {
                last.page_count += pages;
                last.paged_out_pages += paged_out_pages;
                return ControlFlow::Continue(());
            }
        }
        if self.regions.len() >= self.mm.config.max_regions {
            return ControlFlow::Break(());
        }
        self.regions.push(MemoryRegion {
            va_base: va,
            page_count: pages,
            flags,
            paged_out_pages,
        });
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixture::{Fixture, DTB};
    use crate::memory::config::MmConfig;
    use crate::memory::process::Process;
    use crate::memory::types::{MemoryRegion, PageFlags, PagingLevel};
    use std::sync::Arc;

    fn region(va_base: u64, page_count: u64, flags: u32, paged_out_pages: u32) -> MemoryRegion {
        MemoryRegion {
            va_base,
            page_count,
            flags: PageFlags(flags),
            paged_out_pages,
        }
    }

    fn assert_well_formed(regions: &[MemoryRegion]) {
        for pair in regions.windows(2) {
            assert!(pair[0].va_end() <= pair[1].va_base, "overlap or unsorted: {:?}", pair);
            assert!(
                pair[0].flags != pair[1].flags || pair[0].va_end() != pair[1].va_base,
                "unmerged neighbours: {:?}",
                pair
            );
        }
    }

    #[test]
    fn test_merges_contiguous_pages_with_equal_flags() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        fixture.map_4k(0x0040_1000, 0x0050_0000, 0x7);
        fixture.map_4k(0x0040_2000, 0x0031_0000, 0x5);
        fixture.map_4k(0x0040_5000, 0x0032_0000, 0x5);

        let map = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert_eq!(
            map.regions(),
            &[
                region(0x0040_0000, 2, 0x6, 0),
                region(0x0040_2000, 1, 0x4, 0),
                region(0x0040_5000, 1, 0x4, 0),
            ]
        );
        assert_well_formed(map.regions());
    }

    #[test]
    fn test_large_page_region_and_merge_across_directory() {
        let fixture = Fixture::new();
        fixture.map_4m(0x0140_0000, 0x0180_0000, 0x6);
        fixture.map_4k(0x0180_0000, 0x0030_0000, 0x7);

        let map = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert_eq!(map.regions(), &[region(0x0140_0000, 1025, 0x6, 0)]);
    }

    #[test]
    fn test_zero_entries_are_skipped() {
        let fixture = Fixture::new();
        fixture.set_pde(5, 0);
        let map = fixture.model().pte_map(&Process::new(1, DTB, false));
        assert!(map.is_empty());
    }

    #[test]
    fn test_paged_out_entries_extend_regions() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        let table = Fixture::table_for(1);
        // Transition entry, then a generic paged-out entry.
        fixture.set_pte(table, 1, 0x0003_1846);
        fixture.set_pte(table, 2, 0x0000_0400);
        // Paged-out entry starting its own run.
        fixture.set_pte(table, 8, 0x0000_0800);

        let map = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert_eq!(
            map.regions(),
            &[region(0x0040_0000, 3, 0x6, 2), region(0x0040_8000, 1, 0x4, 1)]
        );
    }

    #[test]
    fn test_supervisor_directory_narrows_children() {
        let fixture = Fixture::new();
        let table = fixture.map_table(1, 0x3);
        fixture.set_pte(table, 0, 0x0030_0007);
        fixture.set_pte(table, 1, 0x0031_0007);

        let all = fixture.model().pte_map(&Process::new(1, DTB, false));
        assert_eq!(all.regions(), &[region(0x0040_0000, 2, 0x2, 0)]);
        assert!(all.regions().iter().all(|r| !r.flags.is_user()));

        let user = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert!(user.is_empty());
    }

    #[test]
    fn test_frames_above_max_physical_address_are_discarded() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        fixture.map_4k(0x0040_1000, 0x2000_0000, 0x7);
        fixture.map_4m(0x0140_0000, 0x4000_0000, 0x6);

        let map = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert_eq!(map.regions(), &[region(0x0040_0000, 1, 0x6, 0)]);
    }

    #[test]
    fn test_reserved_large_page_is_not_a_region() {
        let fixture = Fixture::new();
        fixture.map_4m(0x0140_0000, 0x0180_0000, 0x6 | 0x0002_0000);
        let map = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert!(map.is_empty());
    }

    #[test]
    fn test_missing_table_skips_subtree() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        fixture.map_4k(0x0080_0000, 0x0031_0000, 0x7);
        fixture.layer().unmap_page(Fixture::table_for(1));

        let map = fixture.model().pte_map(&Process::new(1, DTB, true));
        assert_eq!(map.regions(), &[region(0x0080_0000, 1, 0x6, 0)]);
    }

    #[test]
    fn test_region_cap_truncates() {
        let fixture = Fixture::new();
        for i in 0..6u64 {
            fixture.map_4k(0x0040_0000 + i * 0x2000, 0x0030_0000, 0x7);
        }
        fixture.map_4k(0x0080_0000, 0x0030_0000, 0x7);
        let config = MmConfig {
            max_regions: 3,
            ..fixture.config()
        };

        let map = fixture.model_with(config).pte_map(&Process::new(1, DTB, true));
        assert_eq!(map.len(), 3);
        assert_eq!(map.regions()[2].va_base, 0x0040_4000);
        assert_well_formed(map.regions());
    }

    #[test]
    fn test_map_is_memoized() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        let (mm, source) = fixture.counting();
        let process = Process::new(1, DTB, true);

        let first = mm.pte_map(&process);
        fixture.map_4k(0x0040_1000, 0x0031_0000, 0x7);
        let maps: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| mm.pte_map(&process))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(maps.iter().all(|map| Arc::ptr_eq(map, &first)));
        assert_eq!(first.len(), 1);
        assert_eq!(source.prefetches().len(), 1);
    }

    #[test]
    fn test_regions_agree_with_single_translation() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        fixture.map_4k(0x0040_1000, 0x0055_0000, 0x5);
        fixture.map_4k(0x0090_3000, 0x0031_0000, 0x7);
        fixture.map_4m(0x0140_0000, 0x0180_0000, 0x6);
        let mm = fixture.model();

        let map = mm.pte_map(&Process::new(1, DTB, true));
        assert_eq!(map.len(), 4);
        for region in map.regions() {
            for page in 0..region.page_count {
                let va = region.va_base + (page << 12);
                assert!(
                    mm.virt2phys(DTB, true, PagingLevel::Directory, va).is_ok(),
                    "region page {:#x} does not translate",
                    va
                );
            }
        }
    }
}
