//! Per-upload staging areas.
//!
//! An upload is chunked into its own short-lived block store under the staging
//! root. Once the pin has been recorded the blocks are migrated into permanent
//! storage and the area is removed.

use crate::backends::filesystem::FilesystemBlockStore;
use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Identifier of a staging area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StagingId(Uuid);

impl StagingId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StagingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A freshly allocated staging block store.
#[derive(Clone, Debug)]
pub struct StagingArea {
    pub id: StagingId,
    pub store: Arc<FilesystemBlockStore>,
}

/// Allocates and removes staging areas under one root directory.
#[derive(Debug)]
pub struct StagingManager {
    root: PathBuf,
}

impl StagingManager {
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn area_path(&self, id: StagingId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Create an empty staging store.
    #[instrument(skip(self))]
    pub async fn alloc_new(&self) -> StorageResult<StagingArea> {
        let id = StagingId::new();
        let store = FilesystemBlockStore::new(self.area_path(id)).await?;
        Ok(StagingArea {
            id,
            store: Arc::new(store),
        })
    }

    /// Remove a staging store and everything in it.
    #[instrument(skip(self))]
    pub async fn clean_up(&self, id: StagingId) -> StorageResult<()> {
        fs::remove_dir_all(self.area_path(id))
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::StagingNotFound(id.to_string())
                } else {
                    StorageError::Io(e)
                }
            })
    }

    /// Remove areas left behind by a previous process.
    ///
    /// Returns how many were removed. Entries that fail to delete are logged
    /// and skipped.
    pub async fn clean_stale(&self) -> StorageResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale staging entry"),
            }
        }
        if removed > 0 {
            info!(removed, root = %self.root.display(), "removed stale staging areas");
        }
        Ok(removed)
    }
}
