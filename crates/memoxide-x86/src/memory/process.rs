//! Per-process address space bookkeeping.

use crate::memory::types::PteMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Address space descriptor of one process.
///
/// Owns the lazily built region map and the one-shot spider flag. Both are
/// safe to use from several threads.
pub struct Process {
    pid: u32,
    /// Page directory base (CR3).
    dtb: u64,
    /// Only user-accessible pages are considered.
    user_only: bool,
    tlb_spider_done: AtomicBool,
    lock_spider: Mutex<()>,
    lock_update: Mutex<()>,
    pte_map: OnceLock<Arc<PteMap>>,
}

impl Process {
    pub fn new(pid: u32, dtb: u64, user_only: bool) -> Self {
        Process {
            pid,
            dtb: dtb & !0xfff,
            user_only,
            tlb_spider_done: AtomicBool::new(false),
            lock_spider: Mutex::new(()),
            lock_update: Mutex::new(()),
            pte_map: OnceLock::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn dtb(&self) -> u64 {
        self.dtb
    }

    pub fn user_only(&self) -> bool {
        self.user_only
    }

    pub fn is_tlb_spider_done(&self) -> bool {
        self.tlb_spider_done.load(Ordering::Acquire)
    }

    /// Run `spider` unless it already succeeded for this process.
    ///
    /// Concurrent callers wait on the spider lock and then see the flag.
    /// The flag is only set when `spider` returns `true`.
    pub(crate) fn tlb_spider_once(&self, spider: impl FnOnce() -> bool) {
        if self.is_tlb_spider_done() {
            return;
        }
        let _guard = self.lock_spider.lock();
        if self.is_tlb_spider_done() {
            return;
        }
        if spider() {
            self.tlb_spider_done.store(true, Ordering::Release);
        }
    }

    /// The region map, if it has been built.
    pub fn pte_map(&self) -> Option<Arc<PteMap>> {
        self.pte_map.get().cloned()
    }

    /// Return the region map, building it with `build` on first use.
    ///
    /// Only one thread builds; others wait on the update lock and then see
    /// the stored map.
    pub(crate) fn pte_map_or_build(&self, build: impl FnOnce() -> PteMap) -> Arc<PteMap> {
        if let Some(map) = self.pte_map.get() {
            return map.clone();
        }
        let _guard = self.lock_update.lock();
        if let Some(map) = self.pte_map.get() {
            return map.clone();
        }
        let map = Arc::new(build());
        // Cannot fail: writers are serialized by lock_update.
        let _ = self.pte_map.set(map.clone());
        map
    }
}
