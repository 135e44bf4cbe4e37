//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use futures::Stream;
use shuttle_core::{Block, ContentAddress};
use std::pin::Pin;

/// A boxed stream of block addresses.
pub type CidStream = Pin<Box<dyn Stream<Item = StorageResult<ContentAddress>> + Send>>;

/// Content-addressed block storage.
///
/// Blocks are immutable, so writing an address that already exists is a no-op
/// and concurrent writers of the same block cannot conflict.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    async fn has(&self, cid: &ContentAddress) -> StorageResult<bool>;

    /// Fetch a block. Missing blocks are [`StorageError::NotFound`](crate::StorageError::NotFound).
    async fn get(&self, cid: &ContentAddress) -> StorageResult<Block>;

    async fn put(&self, block: Block) -> StorageResult<()>;

    /// Store a batch of blocks.
    async fn put_many(&self, blocks: Vec<Block>) -> StorageResult<()> {
        for block in blocks {
            self.put(block).await?;
        }
        Ok(())
    }

    async fn delete(&self, cid: &ContentAddress) -> StorageResult<()>;

    /// Every address currently stored, in no particular order.
    fn all_keys(&self) -> CidStream;

    /// Static identifier used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify the store is reachable and usable.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
