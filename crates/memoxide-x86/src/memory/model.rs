//! Memory model function table and the slot holding the active model.

use crate::memory::config::MmConfig;
use crate::memory::error::{MmError, MmResult};
use crate::memory::process::Process;
use crate::memory::traits::PageTableSource;
use crate::memory::translators::intel32::MmX86;
use crate::memory::types::{
    ExtendedEntry, MemoryModelType, PagingLevel, Phys2VirtInformation, PteMap,
    TranslationRequest, Virt2PhysInformation,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Entry points a paging model exposes to the virtual memory subsystem.
pub trait MemoryModel: Send + Sync {
    fn model_type(&self) -> MemoryModelType;

    /// Release model resources. Called once when the model is replaced or
    /// the slot is closed.
    fn close(&self) {}

    /// Translate one virtual address starting at the table `table_pa`.
    /// `level` defaults to the top level.
    fn virt2phys(
        &self,
        table_pa: u64,
        user_only: bool,
        level: Option<PagingLevel>,
        va: u64,
    ) -> MmResult<u64>;

    /// Translate a batch of requests in place.
    fn virt2phys_batch(&self, dtb: u64, requests: &mut [TranslationRequest], user_only: bool);

    /// Resolve attributes for an ordered run of pages in place.
    fn virt2phys_extended(&self, dtb: u64, entries: &mut [ExtendedEntry]);

    /// Per-level trace of one translation.
    fn virt2phys_information(&self, process: &Process, va: u64) -> Virt2PhysInformation;

    /// Collect virtual addresses of `process` mapping `info.target()`.
    fn phys2virt_information(&self, process: &Process, info: &mut Phys2VirtInformation);

    /// Memoized region map of `process`.
    fn pte_map(&self, process: &Process) -> Arc<PteMap>;

    /// Warm the page table source for `process`. One-shot.
    fn tlb_spider(&self, process: &Process);
}

/// Owner of the page table source, the configuration and the active model.
pub struct Vmm {
    source: Arc<dyn PageTableSource>,
    config: MmConfig,
    model: RwLock<Option<Arc<dyn MemoryModel>>>,
}

impl Vmm {
    pub fn new(source: Arc<dyn PageTableSource>, config: MmConfig) -> Self {
        Vmm {
            source,
            config,
            model: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &MmConfig {
        &self.config
    }

    /// Install the x86 32-bit model, closing any previous one.
    pub fn initialize_x86(&self) {
        let model: Arc<dyn MemoryModel> = Arc::new(MmX86::new(self.source.clone(), self.config.clone()));
        let previous = self.model.write().replace(model);
        if let Some(previous) = previous {
            previous.close();
        }
        debug!("Memory model initialized: {:?}", MemoryModelType::X86);
    }

    /// Close the active model, leaving the slot empty.
    pub fn close(&self) {
        let model = self.model.write().take();
        if let Some(model) = model {
            model.close();
            debug!("Memory model closed: {:?}", model.model_type());
        }
    }

    pub fn model_type(&self) -> MemoryModelType {
        self.model
            .read()
            .as_ref()
            .map_or(MemoryModelType::Na, |model| model.model_type())
    }

    /// The active model.
    pub fn model(&self) -> MmResult<Arc<dyn MemoryModel>> {
        self.model.read().clone().ok_or(MmError::NoMemoryModel)
    }

    /// Reverse lookup with the configured result cap.
    pub fn phys2virt(&self, process: &Process, pa: u64) -> MmResult<Phys2VirtInformation> {
        let mut info = Phys2VirtInformation::new(pa, self.config.max_phys2virt_results);
        self.model()?.phys2virt_information(process, &mut info);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::translators::intel32::fixture::{Fixture, DTB};

    #[test]
    fn test_initialize_and_close() {
        let fixture = Fixture::new();
        let vmm = Vmm::new(fixture.cache(), fixture.config());

        assert_eq!(vmm.model_type(), MemoryModelType::Na);
        assert!(matches!(vmm.model(), Err(MmError::NoMemoryModel)));

        vmm.initialize_x86();
        assert_eq!(vmm.model_type(), MemoryModelType::X86);
        vmm.initialize_x86();
        assert_eq!(vmm.model_type(), MemoryModelType::X86);

        vmm.close();
        assert_eq!(vmm.model_type(), MemoryModelType::Na);
        assert!(vmm.model().is_err());
    }

    #[test]
    fn test_dispatch_through_model() {
        let fixture = Fixture::new();
        fixture.map_4k(0x0040_0000, 0x0030_0000, 0x7);
        let vmm = Vmm::new(fixture.cache(), fixture.config());
        vmm.initialize_x86();
        let model = vmm.model().unwrap();

        assert_eq!(model.virt2phys(DTB, true, None, 0x0040_0010).unwrap(), 0x0030_0010);

        let process = Process::new(1, DTB, true);
        let map = model.pte_map(&process);
        assert_eq!(map.len(), 1);
        assert!(process.is_tlb_spider_done());

        let info = vmm.phys2virt(&process, 0x0030_0abc).unwrap();
        assert_eq!(info.virtual_addresses(), &[0x0040_0abc]);
    }
}
