//! Filesystem blob store.

use bevy::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::constants::BLOB_EXTENSION;
use crate::error::BlobError;

use super::BlobStore;

/// Stores every blob as `{dir}/{name}.sav`.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the platform saves directory
    pub fn in_saves_dir() -> Self {
        Self::new(crate::paths::saves_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, BLOB_EXTENSION))
    }
}

impl BlobStore for FileBlobStore {
    fn exists(&self, name: &str) -> bool {
        self.blob_path(name).is_file()
    }

    fn load(&self, name: &str) -> Result<Vec<u8>, BlobError> {
        std::fs::read(self.blob_path(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BlobError::NotFound(name.to_string()),
            _ => BlobError::Io(e),
        })
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
        }

        // Write next to the target and rename so readers never see half a blob
        let path = self.blob_path(name);
        let tmp = path.with_extension(format!("{}.tmp", BLOB_EXTENSION));
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!("Wrote blob {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), BlobError> {
        std::fs::remove_file(self.blob_path(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BlobError::NotFound(name.to_string()),
            _ => BlobError::Io(e),
        })
    }
}
