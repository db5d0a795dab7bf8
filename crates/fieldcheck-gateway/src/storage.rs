//! Filesystem-backed blob storage for uploaded photo payloads.

use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Stores raw blobs under `root/bucket/path`, keyed by a
/// `bucket/path` locator.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|error| AppError::internal(format!("cannot create storage root: {error}")))?;
        Ok(Self { root })
    }

    /// Persist bytes and return their locator.
    pub fn store(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, AppError> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| AppError::internal(format!("cannot create bucket: {error}")))?;
        }
        std::fs::write(&target, bytes)
            .map_err(|error| AppError::internal(format!("cannot write blob: {error}")))?;
        tracing::debug!(bucket, path, size = bytes.len(), "Stored blob");
        Ok(format!("{bucket}/{path}"))
    }

    /// Read bytes back by bucket and path.
    pub fn retrieve(&self, bucket: &str, path: &str) -> Result<Vec<u8>, AppError> {
        let target = self.resolve(bucket, path)?;
        if !target.exists() {
            return Err(AppError::not_found(format!("blob {bucket}/{path}")));
        }
        std::fs::read(&target)
            .map_err(|error| AppError::internal(format!("cannot read blob: {error}")))
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, AppError> {
        validate_segment(bucket)?;
        if path.is_empty() {
            return Err(AppError::bad_request("blob path must not be empty"));
        }
        for segment in path.split('/') {
            validate_segment(segment)?;
        }
        Ok(self.root.join(bucket).join(Path::new(path)))
    }
}

fn validate_segment(segment: &str) -> Result<(), AppError> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "invalid blob path segment: `{segment}`"
        )))
    }
}
