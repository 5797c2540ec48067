//! Blob storage for slot files.
//!
//! The orchestrator only ever talks to [`BlobStore`]; the concrete backend is
//! picked by the host:
//!
//! - [`FileBlobStore`] - one `.sav` file per blob under a directory
//! - [`MemoryBlobStore`] - process-local map, for tests and headless tools

mod file;
mod memory;


pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::BlobError;

/// Named binary blob storage shared between the main loop and I/O tasks.
pub trait BlobStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn load(&self, name: &str) -> Result<Vec<u8>, BlobError>;

    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError>;

    fn delete(&self, name: &str) -> Result<(), BlobError>;
}
