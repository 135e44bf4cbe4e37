//! Pin and object persistence for the shuttle storage node.
//!
//! This crate provides the local data model:
//! - Pins and their lifecycle flags
//! - Objects discovered while walking pinned DAGs
//! - The pin-to-object references used to reclaim unreferenced objects

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{NewObject, NewPin, ObjectRow, PinRow};
pub use repos::{ObjectRepo, PinRepo};
pub use store::{MetadataStore, SqliteStore};

use shuttle_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
