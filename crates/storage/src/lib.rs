//! Block storage for the shuttle storage node.
//!
//! This crate provides:
//! - The content-addressed [`BlockStore`] abstraction
//! - A sharded local filesystem backend with atomic writes
//! - An in-memory backend
//! - Per-upload staging areas

pub mod backends;
pub mod error;
pub mod staging;
pub mod traits;

pub use backends::{filesystem::FilesystemBlockStore, memory::MemoryBlockStore};
pub use error::{StorageError, StorageResult};
pub use staging::{StagingArea, StagingId, StagingManager};
pub use traits::{BlockStore, CidStream};

use shuttle_core::config::NodeConfig;
use std::sync::Arc;

/// Open the permanent block store described by the node configuration.
pub async fn from_config(config: &NodeConfig) -> StorageResult<Arc<dyn BlockStore>> {
    let store = FilesystemBlockStore::new(config.blockstore_path()).await?;
    store.health_check().await?;
    Ok(Arc::new(store))
}
