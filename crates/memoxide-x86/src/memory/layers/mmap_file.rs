//! Memory-mapped raw dump layer.
//!
//! Provides a read-only physical memory layer backed by a memory-mapped
//! dump file for efficient random access to page tables.

use crate::memory::error::{MmError, MmResult};
use crate::memory::traits::MemoryLayer;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

/// A read-only memory-mapped raw dump.
///
/// # Example
///
/// ```rust,ignore
/// use memoxide_x86::memory::layers::MmapFileLayer;
///
/// let layer = MmapFileLayer::open("physical", "/path/to/dump.raw")?;
/// let page = layer.read_bytes(0x1000, 4096)?;
/// ```
pub struct MmapFileLayer {
    /// Layer name.
    name: String,
    /// Path of the dump file.
    path: PathBuf,
    /// The mapping; `None` for an empty file.
    mmap: Option<Mmap>,
    /// File size.
    size: u64,
    /// Set once the layer has been destroyed.
    destroyed: bool,
}

impl MmapFileLayer {
    /// Open a dump file read-only.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> MmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let mmap = if size == 0 {
            None
        } else {
            // SAFETY: the dump is opened read-only and treated as immutable.
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        Ok(MmapFileLayer {
            name: name.into(),
            path,
            mmap,
            size,
            destroyed: false,
        })
    }

    fn data(&self) -> MmResult<&[u8]> {
        if self.destroyed {
            return Err(MmError::layer_destroyed(&self.name));
        }
        Ok(self.mmap.as_deref().unwrap_or(&[]))
    }

    /// Read bytes from the dump. Short reads are errors.
    pub fn read_bytes(&self, offset: u64, length: usize) -> MmResult<Vec<u8>> {
        let data = self.data()?;
        let end = offset.checked_add(length as u64);
        match end {
            Some(end) if end <= self.size => {
                let start = offset as usize;
                Ok(data[start..start + length].to_vec())
            }
            _ => Err(MmError::invalid_address(
                &self.name,
                offset,
                "Read outside of the dump boundaries",
            )),
        }
    }

    /// Destroy the layer, releasing the mapping.
    pub fn destroy(&mut self) {
        self.mmap = None;
        self.destroyed = true;
    }

    /// The dump file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MemoryLayer for MmapFileLayer {
    fn read(&self, offset: u64, length: usize) -> MmResult<Vec<u8>> {
        self.read_bytes(offset, length)
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        if length == 0 || self.destroyed {
            return false;
        }
        offset
            .checked_add(length)
            .map_or(false, |end| end <= self.size)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        self.size.saturating_sub(1)
    }
}
