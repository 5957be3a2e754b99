//! Translation layer implementations.
//!
//! ## Supported Architectures
//!
//! ### Intel x86
//! - `MmX86` - 32-bit x86 paging (2-level, 4GB address space, 4KB and 4MB pages)

pub mod intel32;

pub use intel32::MmX86;
