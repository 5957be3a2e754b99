//! Error types for memory model operations.

use thiserror::Error;

/// Errors that can occur while translating or walking page tables.
#[derive(Error, Debug)]
pub enum MmError {
    /// A virtual or physical address does not fit the 32-bit model.
    #[error("Address {address:#x} outside of the 32-bit address range")]
    AddressOutOfRange { address: u64 },

    /// No valid mapping at the given paging level. `entry` is the raw
    /// (possibly zero) entry so callers can tell "never mapped" apart from
    /// "mapped but not resident".
    #[error("Page not present at {address:#x} (level={level}, entry={entry:#x})")]
    PageNotPresent { address: u64, level: u8, entry: u32 },

    /// The entry exists but is not user-accessible under a user-only filter.
    #[error("Supervisor page at {address:#x} (level={level}, entry={entry:#x})")]
    SupervisorPage { address: u64, level: u8, entry: u32 },

    /// A 4MB page entry has bits set in its reserved range.
    #[error("Reserved bits set in large page entry {entry:#x} for {address:#x}")]
    ReservedBits { address: u64, entry: u32 },

    /// The page table page could not be fetched (e.g. outside of the dump).
    #[error("Page table {table:#x} unavailable")]
    TableUnavailable { table: u64 },

    /// An address is not valid in a physical layer.
    #[error("Invalid address {invalid_address:#x} in layer '{layer_name}': {message}")]
    InvalidAddress {
        layer_name: String,
        invalid_address: u64,
        message: String,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The layer has been destroyed and cannot be used.
    #[error("Layer '{0}' has been destroyed")]
    LayerDestroyed(String),

    /// The memory model slot is closed.
    #[error("No memory model initialized")]
    NoMemoryModel,
}

impl MmError {
    /// Create an InvalidAddress error.
    pub fn invalid_address(layer_name: impl Into<String>, addr: u64, msg: impl Into<String>) -> Self {
        MmError::InvalidAddress {
            layer_name: layer_name.into(),
            invalid_address: addr,
            message: msg.into(),
        }
    }

    /// Create a LayerDestroyed error.
    pub fn layer_destroyed(name: impl Into<String>) -> Self {
        MmError::LayerDestroyed(name.into())
    }

    /// The raw page table entry carried by a translation failure, if any.
    pub fn entry(&self) -> Option<u32> {
        match self {
            MmError::PageNotPresent { entry, .. }
            | MmError::SupervisorPage { entry, .. }
            | MmError::ReservedBits { entry, .. } => Some(*entry),
            _ => None,
        }
    }
}

/// Result type for memory model operations.
pub type MmResult<T> = Result<T, MmError>;
