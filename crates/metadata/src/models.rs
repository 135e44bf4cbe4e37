//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use shuttle_core::{ContentAddress, PinStatus};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A content root this node has agreed to store.
#[derive(Debug, Clone, FromRow)]
pub struct PinRow {
    pub id: i64,
    /// Coordinator-assigned content id.
    pub content: i64,
    pub cid: String,
    pub user_id: i64,
    pub active: bool,
    pub pinning: bool,
    pub failed: bool,
    pub size: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PinRow {
    pub fn content_address(&self) -> MetadataResult<ContentAddress> {
        self.cid
            .parse()
            .map_err(|e| MetadataError::InvalidRow(format!("pin {} cid: {e}", self.id)))
    }

    /// Persisted status. A pin that is neither terminal nor marked pinning
    /// has not started processing and reads as queued.
    pub fn status(&self) -> PinStatus {
        if self.active {
            PinStatus::Pinned
        } else if self.failed {
            PinStatus::Failed
        } else if self.pinning {
            PinStatus::Pinning
        } else {
            PinStatus::Queued
        }
    }
}

/// Values for a new pin row.
#[derive(Debug, Clone)]
pub struct NewPin {
    pub content: i64,
    pub cid: ContentAddress,
    pub user_id: i64,
}

/// A unique node discovered while walking a pin's DAG.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ObjectRow {
    pub id: i64,
    pub cid: String,
    pub size: i64,
}

impl ObjectRow {
    pub fn content_address(&self) -> MetadataResult<ContentAddress> {
        self.cid
            .parse()
            .map_err(|e| MetadataError::InvalidRow(format!("object {} cid: {e}", self.id)))
    }
}

/// Values for a new object row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewObject {
    pub cid: ContentAddress,
    pub size: u64,
}

/// Saturating conversion for byte counts stored as SQLite integers.
pub(crate) fn to_db_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
