//! Physical memory layer implementations.

pub mod buffer;
pub mod mmap_file;

pub use buffer::BufferLayer;
pub use mmap_file::MmapFileLayer;
