//! Ingestion pipeline.
//!
//! Turns bytes into a stored DAG, walks DAGs into object rows, and moves
//! blocks between stores. The reclamation lock lives here because recording
//! object references and reclaiming unreferenced objects must not interleave.

use bytes::Bytes;
use futures::stream::{FuturesUnordered, Stream, StreamExt, TryStreamExt};
use shuttle_core::config::PinningConfig;
use shuttle_core::importer::{DagBuilder, ImportParams};
use shuttle_core::protocol::PinObject;
use shuttle_core::{Block, ContentAddress};
use shuttle_metadata::{
    MetadataError, MetadataStore, NewObject, ObjectRepo, ObjectRow, PinRepo, PinRow,
};
use shuttle_storage::{BlockStore, StorageError};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::metrics;
use crate::network::{Network, NetworkError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("invalid dag: {0}")]
    Dag(#[from] shuttle_core::Error),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("failed to read input: {0}")]
    Read(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Result of chunking an input stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportOutcome {
    pub root: ContentAddress,
    /// Input length in bytes.
    pub bytes: u64,
    /// Blocks written, including link nodes.
    pub blocks: usize,
}

/// Every object reachable from a root, each listed once.
#[derive(Clone, Debug, Default)]
pub struct WalkSummary {
    pub total_size: u64,
    pub objects: Vec<NewObject>,
}

impl WalkSummary {
    pub fn pin_objects(&self) -> Vec<PinObject> {
        self.objects
            .iter()
            .map(|o| PinObject {
                cid: o.cid,
                size: o.size,
            })
            .collect()
    }
}

/// Chunk `input` with the fixed-size splitter and write the DAG to `store`.
#[instrument(skip_all, fields(chunk_size = params.chunk_size))]
pub async fn import<S, E>(
    params: ImportParams,
    store: &dyn BlockStore,
    input: S,
) -> IngestResult<ImportOutcome>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut builder = DagBuilder::new(params)?;
    let mut blocks = 0;
    let mut input = std::pin::pin!(input);

    while let Some(chunk) = input.next().await {
        let chunk = chunk.map_err(|e| IngestError::Read(e.to_string()))?;
        let ready = builder.push(&chunk);
        blocks += ready.len();
        store.put_many(ready).await?;
    }

    let bytes = builder.total_bytes();
    let (root, tail) = builder.finish()?;
    blocks += tail.len();
    store.put_many(tail).await?;

    metrics::BYTES_INGESTED.inc_by(bytes);
    debug!(root = %root, bytes, blocks, "import complete");
    Ok(ImportOutcome {
        root,
        bytes,
        blocks,
    })
}

/// Copy every block of `from` into `to`, `batch_size` blocks at a time.
#[instrument(skip_all, fields(from = from.backend_name(), to = to.backend_name()))]
pub async fn migrate(
    from: &dyn BlockStore,
    to: &dyn BlockStore,
    batch_size: usize,
) -> IngestResult<usize> {
    let mut keys = from.all_keys();
    let mut batch = Vec::with_capacity(batch_size);
    let mut moved = 0;

    while let Some(cid) = keys.try_next().await? {
        batch.push(from.get(&cid).await?);
        if batch.len() >= batch_size {
            moved += batch.len();
            to.put_many(std::mem::take(&mut batch)).await?;
        }
    }
    if !batch.is_empty() {
        moved += batch.len();
        to.put_many(batch).await?;
    }

    debug!(moved, "migration complete");
    Ok(moved)
}

/// Objects removed by an unpin.
#[derive(Clone, Debug, Default)]
pub struct Reclaimed {
    pub pin: Option<PinRow>,
    pub objects: Vec<ObjectRow>,
}

pub struct Ingester {
    blockstore: Arc<dyn BlockStore>,
    metadata: Arc<dyn MetadataStore>,
    network: Arc<dyn Network>,
    config: PinningConfig,
    reclaim_lock: Mutex<()>,
}

impl Ingester {
    pub fn new(
        blockstore: Arc<dyn BlockStore>,
        metadata: Arc<dyn MetadataStore>,
        network: Arc<dyn Network>,
        config: PinningConfig,
    ) -> Self {
        Self {
            blockstore,
            metadata,
            network,
            config,
            reclaim_lock: Mutex::new(()),
        }
    }

    pub fn blockstore(&self) -> &Arc<dyn BlockStore> {
        &self.blockstore
    }

    pub fn config(&self) -> &PinningConfig {
        &self.config
    }

    /// Read a block from `source`, falling back to the network. Fetched
    /// blocks are written to `source`.
    async fn load_block(
        &self,
        source: &dyn BlockStore,
        cid: ContentAddress,
    ) -> IngestResult<Block> {
        match source.get(&cid).await {
            Ok(block) => Ok(block),
            Err(e) if e.is_not_found() => {
                let block = self.network.fetch_block(&cid).await?;
                source.put(block.clone()).await?;
                Ok(block)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Visit every node reachable from `root` exactly once.
    ///
    /// Up to `walk_concurrency` blocks are loaded at a time. Raw leaves are
    /// not descended into.
    #[instrument(skip(self, source), fields(root = %root))]
    pub async fn walk(
        &self,
        root: ContentAddress,
        source: &dyn BlockStore,
    ) -> IngestResult<WalkSummary> {
        let mut visited = HashSet::from([root]);
        let mut pending = VecDeque::from([root]);
        let mut in_flight = FuturesUnordered::new();
        let mut summary = WalkSummary::default();

        loop {
            while in_flight.len() < self.config.walk_concurrency
                && let Some(cid) = pending.pop_front()
            {
                in_flight.push(self.load_block(source, cid));
            }

            let Some(loaded) = in_flight.next().await else {
                break;
            };
            let block = loaded?;

            summary.total_size += block.size();
            summary.objects.push(NewObject {
                cid: *block.cid(),
                size: block.size(),
            });

            for child in block.links()? {
                if visited.insert(child) {
                    pending.push_back(child);
                }
            }
        }

        Ok(summary)
    }

    /// Persist a walk: objects, then references, then the pin's active flag.
    ///
    /// The walk runs outside the reclamation lock, so an unpin may have
    /// removed some of its blocks from `source` since. Under the lock every
    /// walked block is checked and any missing one is loaded again before
    /// the pin is marked active.
    #[instrument(skip(self, pin, summary, source), fields(pin_id = pin.id, content = pin.content, objects = summary.objects.len()))]
    pub async fn record(
        &self,
        pin: &PinRow,
        summary: &WalkSummary,
        source: &dyn BlockStore,
    ) -> IngestResult<()> {
        let _guard = self.reclaim_lock.lock().await;

        for object in &summary.objects {
            if !source.has(&object.cid).await? {
                debug!(cid = %object.cid, "block reclaimed during walk, loading again");
                self.load_block(source, object.cid).await?;
            }
        }

        let ids = self
            .metadata
            .insert_objects(&summary.objects, self.config.object_batch_size)
            .await?;
        self.metadata
            .insert_refs(pin.id, &ids, self.config.ref_batch_size)
            .await?;
        self.metadata
            .mark_pin_active(pin.content, summary.total_size)
            .await?;

        metrics::OBJECTS_RECORDED.inc_by(summary.objects.len() as u64);
        Ok(())
    }

    /// Walk the DAG under `root` from `source` and record it against `pin`.
    pub async fn walk_and_record(
        &self,
        root: ContentAddress,
        pin: &PinRow,
        source: &dyn BlockStore,
    ) -> IngestResult<WalkSummary> {
        let started = Instant::now();
        let summary = self.walk(root, source).await?;
        self.record(pin, &summary, source).await?;
        info!(
            content = pin.content,
            root = %root,
            objects = summary.objects.len(),
            size = summary.total_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pin recorded"
        );
        Ok(summary)
    }

    /// Delete a pin and reclaim every object no other pin references.
    ///
    /// Blocks of reclaimed objects are removed from permanent storage; a
    /// failed block delete is logged and does not fail the unpin.
    #[instrument(skip(self))]
    pub async fn unpin(&self, content: i64) -> IngestResult<Reclaimed> {
        let _guard = self.reclaim_lock.lock().await;

        let Some(pin) = self.metadata.delete_pin(content).await? else {
            return Ok(Reclaimed::default());
        };
        let objects = self.metadata.delete_unreferenced_objects().await?;

        for object in &objects {
            let cid = match object.content_address() {
                Ok(cid) => cid,
                Err(e) => {
                    warn!(object = %object.cid, error = %e, "skipping block removal for unparsable address");
                    continue;
                }
            };
            match self.blockstore.delete(&cid).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(cid = %cid, error = %e, "failed to remove reclaimed block"),
            }
        }

        metrics::OBJECTS_RECLAIMED.inc_by(objects.len() as u64);
        info!(content, pin_id = pin.id, reclaimed = objects.len(), "unpinned content");
        Ok(Reclaimed {
            pin: Some(pin),
            objects,
        })
    }
}
