//! Object and object-reference repository.

use crate::error::MetadataResult;
use crate::models::{NewObject, ObjectRow};
use async_trait::async_trait;

/// Repository for DAG objects and the pin-to-object join table.
#[async_trait]
pub trait ObjectRepo: Send + Sync {
    /// Insert objects in batches of `batch_size`.
    ///
    /// Addresses that already exist are reused. Returns the object id for each
    /// input, in input order.
    async fn insert_objects(
        &self,
        objects: &[NewObject],
        batch_size: usize,
    ) -> MetadataResult<Vec<i64>>;

    /// Link a pin to objects in batches of `batch_size`. Existing links are kept.
    async fn insert_refs(
        &self,
        pin_id: i64,
        object_ids: &[i64],
        batch_size: usize,
    ) -> MetadataResult<()>;

    async fn get_object(&self, cid: &str) -> MetadataResult<Option<ObjectRow>>;

    async fn objects_for_pin(&self, pin_id: i64) -> MetadataResult<Vec<ObjectRow>>;

    /// Number of pins referencing an object.
    async fn count_refs(&self, object_id: i64) -> MetadataResult<i64>;

    /// Delete every object no pin references and return what was deleted.
    ///
    /// Callers must serialize this against ingestion recording objects for a
    /// new pin, or a freshly shared object can be reclaimed.
    async fn delete_unreferenced_objects(&self) -> MetadataResult<Vec<ObjectRow>>;
}
