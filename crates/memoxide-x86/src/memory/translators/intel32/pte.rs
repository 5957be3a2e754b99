//! 32-bit (non-PAE) page table entry decoding.
//!
//! ```text
//! Virtual Address (32 bits):
//! +------------+------------+--------------+
//! | PD Index   | PT Index   | Page Offset  |
//! | (10 bits)  | (10 bits)  | (12 bits)    |
//! +------------+------------+--------------+
//!  bits 31-22   bits 21-12   bits 11-0
//! ```
//!
//! A directory entry with the PS bit maps a 4MB page. Its physical base is
//! bits 31-22 of the entry plus extension bits shifted above bit 31 (PSE-36).

use crate::memory::types::PagingLevel;
use serde::Serialize;

/// Page table entry flags.
pub const PTE_PRESENT: u32 = 1 << 0;
pub const PTE_WRITE: u32 = 1 << 1;
pub const PTE_USER: u32 = 1 << 2;
pub const PTE_DIRTY: u32 = 1 << 6;
pub const PTE_LARGE: u32 = 1 << 7; // PS, directory level only

/// Frame of a table pointer or 4KB page.
pub const PTE_FRAME_MASK: u32 = 0xffff_f000;

/// Bits 31-22 of a 4MB page base.
pub const PDE_LARGE_BASE_MASK: u32 = 0xffc0_0000;

/// PSE-36 extension bits 16-13, physical bits 35-32.
pub const PDE_LARGE_HIGH_MASK: u32 = 0x0001_e000;

/// PSE-40 reading of the extension field, bits 20-13. Overlaps
/// [`PDE_LARGE_RESERVED_MASK`]; kept for comparison only.
pub const PDE_LARGE_HIGH_MASK_WIDE: u32 = 0x001f_e000;

/// Must be clear in a 4MB page entry.
pub const PDE_LARGE_RESERVED_MASK: u32 = 0x003e_0000;

const PDE_LARGE_HIGH_SHIFT: u32 = 32 - 13;

/// Highest address of the 32-bit model.
pub const MAX_ADDRESS_32: u64 = 0xffff_ffff;

/// Windows transition PTE: not present, transition bit set, prototype clear.
const TRANSITION_MASK: u32 = 0x0c01;
const TRANSITION_VALUE: u32 = 0x0800;

/// Flags given to reconstructed entries: present, read-only, user.
const GUESSED_FLAGS: u32 = PTE_PRESENT | PTE_USER;

/// A raw 32-bit page table entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Pte(pub u32);

impl Pte {
    #[inline]
    pub fn is_present(self) -> bool {
        self.0 & PTE_PRESENT != 0
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.0 & PTE_WRITE != 0
    }

    #[inline]
    pub fn is_user(self) -> bool {
        self.0 & PTE_USER != 0
    }

    #[inline]
    pub fn is_dirty(self) -> bool {
        self.0 & PTE_DIRTY != 0
    }

    #[inline]
    pub fn is_large(self) -> bool {
        self.0 & PTE_LARGE != 0
    }

    /// Frame of a 4KB page or of the next level table.
    #[inline]
    pub fn frame(self) -> u64 {
        u64::from(self.0 & PTE_FRAME_MASK)
    }

    /// Same entry with the user bit cleared.
    #[inline]
    pub fn without_user(self) -> Pte {
        Pte(self.0 & !PTE_USER)
    }

    #[inline]
    pub fn has_reserved_large_bits(self) -> bool {
        self.0 & PDE_LARGE_RESERVED_MASK != 0
    }

    /// Physical base of a 4MB page using the PSE-36 extension field.
    #[inline]
    pub fn large_page_base(self) -> u64 {
        self.large_page_base_with(PDE_LARGE_HIGH_MASK)
    }

    /// Physical base of a 4MB page with an explicit extension field mask.
    #[inline]
    pub fn large_page_base_with(self, high_mask: u32) -> u64 {
        (u64::from(self.0 & high_mask) << PDE_LARGE_HIGH_SHIFT) + u64::from(self.0 & PDE_LARGE_BASE_MASK)
    }

    /// Physical base of the page this entry maps as a leaf at `level`.
    /// `None` for a 4MB entry with reserved bits set.
    #[inline]
    pub fn page_base(self, level: PagingLevel) -> Option<u64> {
        match level {
            PagingLevel::Table => Some(self.frame()),
            PagingLevel::Directory if self.has_reserved_large_bits() => None,
            PagingLevel::Directory => Some(self.large_page_base()),
        }
    }

    /// Physical base this entry points at: the page for a leaf, the next
    /// table otherwise.
    #[inline]
    pub fn target_base(self, level: PagingLevel) -> u64 {
        if level == PagingLevel::Directory && self.is_large() {
            self.large_page_base()
        } else {
            self.frame()
        }
    }
}

/// Physical address of `va` through a leaf entry at `level`.
#[inline]
pub fn leaf_address(pte: Pte, level: PagingLevel, va: u64) -> Option<u64> {
    pte.page_base(level).map(|base| base + (va & level.offset_mask()))
}

/// An entry as seen by the region map builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodedPte {
    /// Nothing mapped here.
    Unmapped,
    /// Present hardware mapping.
    Hardware(Pte),
    /// Reconstructed from a non-present table entry: a decoded transition
    /// PTE keeps its frame, any other paged-out entry guesses frame zero.
    Guessed(Pte),
}

impl DecodedPte {
    pub fn decode(raw: u32, level: PagingLevel, transition_heuristic: bool) -> Self {
        let pte = Pte(raw);
        if pte.is_present() {
            return DecodedPte::Hardware(pte);
        }
        if raw == 0 || level != PagingLevel::Table {
            return DecodedPte::Unmapped;
        }
        if transition_heuristic && raw & TRANSITION_MASK == TRANSITION_VALUE {
            DecodedPte::Guessed(Pte((raw & PTE_FRAME_MASK) | GUESSED_FLAGS))
        } else {
            DecodedPte::Guessed(Pte(GUESSED_FLAGS))
        }
    }

    pub fn pte(self) -> Option<Pte> {
        match self {
            DecodedPte::Unmapped => None,
            DecodedPte::Hardware(pte) | DecodedPte::Guessed(pte) => Some(pte),
        }
    }

    pub fn is_guessed(self) -> bool {
        matches!(self, DecodedPte::Guessed(_))
    }
}
