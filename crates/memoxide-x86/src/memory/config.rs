//! Memory model configuration.

use crate::memory::traits::MemoryLayer;
use serde::{Deserialize, Serialize};

/// Default upper bound on physical addresses (36 bits, the PSE-36 reach).
pub const DEFAULT_MAX_PHYSICAL_ADDRESS: u64 = 0x0000_000f_ffff_ffff;

/// Default cap on regions in one process map.
pub const DEFAULT_MAX_REGIONS: usize = 0x20000;

/// Default cap on virtual addresses returned by one reverse lookup.
pub const DEFAULT_MAX_PHYS2VIRT_RESULTS: usize = 4;

/// Default page table cache capacity, in tables.
pub const DEFAULT_CACHE_CAPACITY: usize = 0x4000;

/// Settings shared by every walk of one memory model instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmConfig {
    /// Highest valid physical address of the device. Frames above it are
    /// discarded as invalid.
    pub max_physical_address: u64,
    /// Hard cap on regions in a process map.
    pub max_regions: usize,
    /// Hard cap on results of one reverse lookup.
    pub max_phys2virt_results: usize,
    /// Page table cache capacity, in tables.
    pub cache_capacity: usize,
    /// Decode Windows 32-bit transition PTEs when building region maps.
    pub transition_heuristic: bool,
}

impl Default for MmConfig {
    fn default() -> Self {
        MmConfig {
            max_physical_address: DEFAULT_MAX_PHYSICAL_ADDRESS,
            max_regions: DEFAULT_MAX_REGIONS,
            max_phys2virt_results: DEFAULT_MAX_PHYS2VIRT_RESULTS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            transition_heuristic: true,
        }
    }
}

impl MmConfig {
    /// Defaults with the physical bound taken from `layer`.
    pub fn for_layer(layer: &dyn MemoryLayer) -> Self {
        MmConfig {
            max_physical_address: layer.maximum_address(),
            ..MmConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::layers::BufferLayer;

    #[test]
    fn test_defaults() {
        let config = MmConfig::default();
        assert_eq!(config.max_regions, 0x20000);
        assert_eq!(config.max_phys2virt_results, 4);
        assert!(config.transition_heuristic);
    }

    #[test]
    fn test_for_layer() {
        let layer = BufferLayer::new("physical", 0x3fff_ffff);
        let config = MmConfig::for_layer(&layer);
        assert_eq!(config.max_physical_address, 0x3fff_ffff);
        assert_eq!(config.max_regions, DEFAULT_MAX_REGIONS);
    }

    #[test]
    fn test_partial_json() {
        let config: MmConfig =
            serde_json::from_str(r#"{"max_physical_address": 268435455, "transition_heuristic": false}"#)
                .unwrap();
        assert_eq!(config.max_physical_address, 0x0fff_ffff);
        assert!(!config.transition_heuristic);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }
}
