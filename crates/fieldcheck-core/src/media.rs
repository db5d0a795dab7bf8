//! Local photo payload storage.
//!
//! Photo bytes are kept on the local filesystem under a content-addressed
//! path until the sync engine uploads them to the gateway's blob storage.
//! The locator recorded on the [`crate::models::Photo`] is the relative
//! path returned by [`PhotoStore::store`].

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::{Error, Result};

/// Filesystem-backed store for captured photo payloads.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Persist photo bytes and return their locator (a relative path).
    pub fn store(&self, submission_id: &str, bytes: &[u8]) -> Result<String> {
        let locator = format!("{submission_id}/{}.bin", Uuid::now_v7());
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes).map_err(|error| {
            if error.raw_os_error() == Some(28) {
                // ENOSPC
                Error::StorageFull
            } else {
                Error::Io(error)
            }
        })?;
        tracing::debug!(locator, size = bytes.len(), "Stored local photo payload");
        Ok(locator)
    }

    /// Read photo bytes back by the locator returned at store time.
    pub fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        if !path.exists() {
            return Err(Error::NotFound(locator.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    /// Remove a stored payload (after the gateway confirms the upload).
    pub fn remove(&self, locator: &str) -> Result<()> {
        let path = self.resolve(locator)?;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        let valid = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !valid || locator.is_empty() {
            return Err(Error::InvalidInput(format!(
                "invalid photo locator: {locator}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = PhotoStore::new(dir.path()).unwrap();

        let locator = store.store("sub-1", b"jpeg-bytes").unwrap();
        assert_eq!(store.read(&locator).unwrap(), b"jpeg-bytes");
    }

    #[test]
    fn test_rejects_traversal_locators() {
        let dir = tempdir().unwrap();
        let store = PhotoStore::new(dir.path()).unwrap();

        assert!(store.read("../etc/passwd").is_err());
        assert!(store.read("/absolute").is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = PhotoStore::new(dir.path()).unwrap();

        let locator = store.store("sub-1", b"x").unwrap();
        store.remove(&locator).unwrap();
        store.remove(&locator).unwrap();
        assert!(store.read(&locator).is_err());
    }
}
