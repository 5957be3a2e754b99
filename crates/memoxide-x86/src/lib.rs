//! memoxide-x86: x86 32-bit (non-PAE) memory model.
//!
//! Decodes two-level page tables read from raw physical memory (a dump,
//! possibly incomplete) through a page table cache, and provides:
//!
//! - single and batch virtual to physical translation
//! - per-page extended attributes
//! - merged region maps of a process address space
//! - physical to virtual reverse lookups
//! - per-level diagnostic traces
//!
//! # Example
//!
//! ```rust,ignore
//! use memoxide_x86::{MmConfig, MmapFileLayer, PageTableCache, Process, Vmm};
//! use std::sync::Arc;
//!
//! let layer = Arc::new(MmapFileLayer::open("physical", "/path/to/dump.raw")?);
//! let config = MmConfig::for_layer(layer.as_ref());
//! let cache = Arc::new(PageTableCache::new(layer, config.cache_capacity));
//! let vmm = Vmm::new(cache, config);
//! vmm.initialize_x86();
//!
//! let process = Process::new(4, 0x0018_5000, true);
//! let map = vmm.model()?.pte_map(&process);
//! ```

pub mod memory;

pub use memory::cache::{PageTable, PageTableCache, PageTableRef};
pub use memory::config::MmConfig;
pub use memory::error::{MmError, MmResult};
pub use memory::layers::{BufferLayer, MmapFileLayer};
pub use memory::model::{MemoryModel, Vmm};
pub use memory::process::Process;
pub use memory::traits::{MemoryLayer, PageTableSource};
pub use memory::translators::MmX86;
pub use memory::types::{
    AttributeFlags, ExtendedEntry, MemoryModelType, MemoryRegion, PageFlags, PagingLevel,
    Phys2VirtInformation, PteMap, TranslationRequest, Virt2PhysInformation,
};
