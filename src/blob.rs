//! Blob storage collaborator for uploaded file bytes.
//!
//! [`FsBlobStore`] keeps blobs under a root directory using the document's
//! `org/document/filename` key layout, creating parent directories on demand.
//! Cloud object stores implement the same [`BlobStore`] trait externally.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::types::RagError;

/// Minimal object-store interface: keys are `/`-separated paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RagError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, RagError>;

    async fn delete(&self, key: &str) -> Result<(), RagError>;
}

/// Filesystem-backed blob store rooted at a directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key beneath the root, refusing empty or traversal segments.
    fn resolve(&self, key: &str) -> Result<PathBuf, RagError> {
        let mut path = self.root.clone();
        let mut segments = 0;
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(RagError::Blob(format!("invalid blob key '{key}'")));
            }
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(RagError::Blob("empty blob key".into()));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), RagError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| RagError::Blob(err.to_string()))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|err| RagError::Blob(err.to_string()))?;
        debug!(key, size = bytes.len(), "stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, RagError> {
        let path = self.resolve(key)?;
        fs::read(&path)
            .await
            .map_err(|err| RagError::Blob(format!("read '{key}': {err}")))
    }

    async fn delete(&self, key: &str) -> Result<(), RagError> {
        let path = self.resolve(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|err| RagError::Blob(format!("delete '{key}': {err}")))
    }
}
