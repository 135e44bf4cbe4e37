//! In-memory block store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlockStore, CidStream};
use async_trait::async_trait;
use bytes::Bytes;
use shuttle_core::{Block, ContentAddress};
use std::collections::HashMap;
use std::sync::RwLock;

/// `HashMap`-backed store for tests and ephemeral staging.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<ContentAddress, Bytes>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().map(|b| b.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StorageError {
        StorageError::Task("memory block store lock poisoned".to_string())
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn has(&self, cid: &ContentAddress) -> StorageResult<bool> {
        let blocks = self.blocks.read().map_err(|_| Self::poisoned())?;
        Ok(blocks.contains_key(cid))
    }

    async fn get(&self, cid: &ContentAddress) -> StorageResult<Block> {
        let data = {
            let blocks = self.blocks.read().map_err(|_| Self::poisoned())?;
            blocks
                .get(cid)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(cid.to_string()))?
        };
        Block::with_cid(*cid, data).map_err(|e| StorageError::Corrupt {
            cid: cid.to_string(),
            reason: e.to_string(),
        })
    }

    async fn put(&self, block: Block) -> StorageResult<()> {
        let mut blocks = self.blocks.write().map_err(|_| Self::poisoned())?;
        blocks
            .entry(*block.cid())
            .or_insert_with(|| block.data().clone());
        Ok(())
    }

    async fn put_many(&self, batch: Vec<Block>) -> StorageResult<()> {
        let mut blocks = self.blocks.write().map_err(|_| Self::poisoned())?;
        for block in batch {
            blocks
                .entry(*block.cid())
                .or_insert_with(|| block.data().clone());
        }
        Ok(())
    }

    async fn delete(&self, cid: &ContentAddress) -> StorageResult<()> {
        let mut blocks = self.blocks.write().map_err(|_| Self::poisoned())?;
        blocks
            .remove(cid)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(cid.to_string()))
    }

    fn all_keys(&self) -> CidStream {
        let keys: Vec<StorageResult<ContentAddress>> = match self.blocks.read() {
            Ok(blocks) => blocks.keys().copied().map(Ok).collect(),
            Err(_) => vec![Err(Self::poisoned())],
        };
        Box::pin(futures::stream::iter(keys))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryBlockStore::new();
        let block = Block::raw(&b"same"[..]);

        store.put(block.clone()).await.unwrap();
        store.put(block.clone()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(block.cid()).await.unwrap(), block);
    }

    #[tokio::test]
    async fn test_delete_and_keys() {
        let store = MemoryBlockStore::new();
        let a = Block::raw(&b"a"[..]);
        let b = Block::raw(&b"b"[..]);
        store.put_many(vec![a.clone(), b.clone()]).await.unwrap();

        store.delete(a.cid()).await.unwrap();
        assert!(store.delete(a.cid()).await.unwrap_err().is_not_found());

        let keys: Vec<_> = store.all_keys().try_collect().await.unwrap();
        assert_eq!(keys, vec![*b.cid()]);
    }
}
