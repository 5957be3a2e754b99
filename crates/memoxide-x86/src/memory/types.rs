//! Data exchanged with memory model callers.

use serde::Serialize;

/// Paging level of a 32-bit (non-PAE) two-level walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PagingLevel {
    /// Page table: 1024 entries of 4KB.
    Table = 1,
    /// Page directory: 1024 entries of 4MB.
    Directory = 2,
}

impl PagingLevel {
    /// Shift of the virtual address bits indexing this level.
    #[inline]
    pub fn shift(self) -> u32 {
        match self {
            PagingLevel::Table => 12,
            PagingLevel::Directory => 22,
        }
    }

    /// Index into this level's table for `va`.
    #[inline]
    pub fn index_of(self, va: u64) -> usize {
        ((va >> self.shift()) & 0x3ff) as usize
    }

    /// Mask of the in-page offset for a leaf mapped at this level.
    #[inline]
    pub fn offset_mask(self) -> u64 {
        (1u64 << self.shift()) - 1
    }

    /// 4KB pages covered by one leaf at this level.
    #[inline]
    pub fn page_count(self) -> u64 {
        1u64 << (self.shift() - 12)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Canonical access flags of a region (the PTE write and user bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PageFlags(pub u32);

impl PageFlags {
    pub const WRITE: u32 = 0x02;
    pub const USER: u32 = 0x04;
    pub const MASK: u32 = Self::WRITE | Self::USER;

    pub fn from_pte(pte: u32) -> Self {
        PageFlags(pte & Self::MASK)
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITE != 0
    }

    pub fn is_user(self) -> bool {
        self.0 & Self::USER != 0
    }
}

/// A run of contiguous virtual pages sharing one set of flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryRegion {
    pub va_base: u64,
    pub page_count: u64,
    pub flags: PageFlags,
    /// Pages in the run reconstructed from non-present (paged out or
    /// transition) entries.
    pub paged_out_pages: u32,
}

impl MemoryRegion {
    /// First virtual address past the region.
    pub fn va_end(&self) -> u64 {
        self.va_base + (self.page_count << 12)
    }
}

/// Merged region map of one process, ascending by virtual address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PteMap {
    regions: Vec<MemoryRegion>,
}

impl PteMap {
    pub fn new(regions: Vec<MemoryRegion>) -> Self {
        PteMap { regions }
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The region containing `va`, if any.
    pub fn find(&self, va: u64) -> Option<&MemoryRegion> {
        let index = self.regions.partition_point(|region| region.va_end() <= va);
        self.regions.get(index).filter(|region| region.va_base <= va)
    }
}

/// One unit of a batch translation, filled in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TranslationRequest {
    pub va: u64,
    pub pa: u64,
    pub resolved: bool,
    /// No hardware mapping at the leaf level; `pte` holds the raw entry.
    pub paging: bool,
    pub pte: u32,
    /// Page table to consult in the next pass.
    pub pending_table: Option<u64>,
}

impl TranslationRequest {
    pub fn new(va: u64) -> Self {
        TranslationRequest {
            va,
            ..Default::default()
        }
    }
}

/// Compact attributes of an extended translation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AttributeFlags(pub u8);

impl AttributeFlags {
    pub const HARDWARE: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const KERNEL: u8 = 0x04;

    pub fn is_hardware(self) -> bool {
        self.0 & Self::HARDWARE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITE != 0
    }

    pub fn is_kernel(self) -> bool {
        self.0 & Self::KERNEL != 0
    }
}

/// One page of an extended-attributes translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExtendedEntry {
    pub va: u64,
    pub pa: u64,
    pub flags: AttributeFlags,
    /// Last raw entry consulted, recorded whether or not it resolved.
    pub pte: u32,
    /// Level of `pte`, `None` until a table was consulted.
    pub level: Option<PagingLevel>,
}

impl ExtendedEntry {
    pub fn new(va: u64) -> Self {
        ExtendedEntry {
            va,
            pa: 0,
            flags: AttributeFlags::default(),
            pte: 0,
            level: None,
        }
    }
}

/// Memory model identifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum MemoryModelType {
    #[default]
    Na,
    X86,
}

/// Per-level trace of one translation. Slot 0 holds the final physical
/// frame, slots 1 and 2 the table consulted at that level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Virt2PhysInformation {
    pub model: MemoryModelType,
    pub va: u64,
    pub pas: [u64; 3],
    pub indices: [u16; 3],
    pub ptes: [u32; 3],
}

impl Virt2PhysInformation {
    pub fn new(model: MemoryModelType, va: u64) -> Self {
        Virt2PhysInformation {
            model,
            va,
            ..Default::default()
        }
    }
}

/// Capped result list of a physical to virtual lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Phys2VirtInformation {
    target: u64,
    max_results: usize,
    vas: Vec<u64>,
}

impl Phys2VirtInformation {
    pub fn new(target: u64, max_results: usize) -> Self {
        Phys2VirtInformation {
            target,
            max_results,
            vas: Vec::new(),
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn virtual_addresses(&self) -> &[u64] {
        &self.vas
    }

    pub fn len(&self) -> usize {
        self.vas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vas.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.vas.len() >= self.max_results
    }

    /// Append a result. Returns `false` once the cap is reached.
    pub(crate) fn push(&mut self, va: u64) -> bool {
        if !self.is_full() {
            self.vas.push(va);
        }
        !self.is_full()
    }
}
