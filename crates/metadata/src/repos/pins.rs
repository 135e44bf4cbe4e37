//! Pin repository.

use crate::error::MetadataResult;
use crate::models::{NewPin, PinRow};
use async_trait::async_trait;

/// Repository for pin rows.
///
/// Pins are addressed by the coordinator's content id, which is unique per row.
#[async_trait]
pub trait PinRepo: Send + Sync {
    /// Insert a pin in the `pinning` state.
    ///
    /// Fails with `AlreadyExists` if a pin for the content id is present.
    async fn create_pin(&self, pin: &NewPin) -> MetadataResult<PinRow>;

    async fn get_pin(&self, id: i64) -> MetadataResult<Option<PinRow>>;

    async fn get_pin_by_content(&self, content: i64) -> MetadataResult<Option<PinRow>>;

    /// Pins left mid-flight (`pinning = true, active = false`).
    async fn list_pins_to_restore(&self) -> MetadataResult<Vec<PinRow>>;

    /// Terminal success: `active = true`, other flags cleared, size recorded.
    async fn mark_pin_active(&self, content: i64, size: u64) -> MetadataResult<()>;

    /// Terminal failure: `failed = true`, other flags cleared.
    async fn mark_pin_failed(&self, content: i64) -> MetadataResult<()>;

    /// Delete the pin and, by cascade, its object references.
    ///
    /// Returns the deleted row, or `None` if there was nothing to delete.
    async fn delete_pin(&self, content: i64) -> MetadataResult<Option<PinRow>>;

    async fn count_active_pins(&self) -> MetadataResult<i64>;
}
