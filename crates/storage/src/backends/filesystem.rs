//! Local filesystem block store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlockStore, CidStream};
use async_trait::async_trait;
use shuttle_core::{Block, ContentAddress};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

/// One file per block, sharded by the first two bytes of the digest:
/// `<root>/<hex[0..2]>/<hex[2..4]>/<cid>`.
#[derive(Debug)]
pub struct FilesystemBlockStore {
    root: PathBuf,
}

impl FilesystemBlockStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, cid: &ContentAddress) -> PathBuf {
        let hex = cid.digest().to_hex();
        self.root
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(cid.to_string())
    }

    fn not_found(cid: &ContentAddress) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(cid.to_string())
            } else {
                StorageError::Io(e)
            }
        }
    }
}

#[async_trait]
impl BlockStore for FilesystemBlockStore {
    #[instrument(skip(self), fields(backend = "filesystem", cid = %cid))]
    async fn has(&self, cid: &ContentAddress) -> StorageResult<bool> {
        fs::try_exists(self.block_path(cid))
            .await
            .map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem", cid = %cid))]
    async fn get(&self, cid: &ContentAddress) -> StorageResult<Block> {
        let data = fs::read(self.block_path(cid))
            .await
            .map_err(Self::not_found(cid))?;
        Block::with_cid(*cid, data).map_err(|e| StorageError::Corrupt {
            cid: cid.to_string(),
            reason: e.to_string(),
        })
    }

    #[instrument(skip(self, block), fields(backend = "filesystem", cid = %block.cid(), size = block.size()))]
    async fn put(&self, block: Block) -> StorageResult<()> {
        let path = self.block_path(block.cid());
        if fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename into place.
        let temp_path = path.with_file_name(format!(
            "{}{TEMP_MARKER}{}",
            block.cid(),
            Uuid::new_v4()
        ));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(block.data()).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem", cid = %cid))]
    async fn delete(&self, cid: &ContentAddress) -> StorageResult<()> {
        fs::remove_file(self.block_path(cid))
            .await
            .map_err(Self::not_found(cid))
    }

    fn all_keys(&self) -> CidStream {
        let root = self.root.clone();

        let stream = async_stream::try_stream! {
            let mut stack = vec![root];
            while let Some(dir) = stack.pop() {
                let mut entries = fs::read_dir(&dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    // file_type() does not follow symlinks
                    let file_type = entry.file_type().await?;
                    if file_type.is_dir() {
                        stack.push(entry.path());
                        continue;
                    }
                    if !file_type.is_file() {
                        continue;
                    }
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if name.contains(TEMP_MARKER) {
                        continue;
                    }
                    match name.parse::<ContentAddress>() {
                        Ok(cid) => yield cid,
                        Err(e) => debug!(file = %name, error = %e, "skipping foreign file in block store"),
                    }
                }
            }
        };

        Box::pin(stream)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("block store root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("block store root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
