//! Background pin queue.
//!
//! Operations are admitted through [`PinQueue::enqueue`] and drained by a
//! bounded pool of workers started with [`PinWorkers::spawn`]. Each processed
//! operation gets exactly one completion callback with its terminal status.

use async_trait::async_trait;
use shuttle_core::protocol::AddrInfo;
use shuttle_core::{ContentAddress, PinStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::ingest::IngestError;
use crate::metrics;

/// One unit of pinning work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinOperation {
    /// Coordinator content id.
    pub content: i64,
    pub user_id: i64,
    pub root: ContentAddress,
    /// Peers likely to hold the data.
    pub peers: Vec<AddrInfo>,
    /// Content to unpin once this one is active. Not persisted.
    pub replace: Option<i64>,
}

#[async_trait]
pub trait PinProcessor: Send + Sync + 'static {
    /// Fetch, walk and record the operation's DAG.
    async fn process(&self, op: &PinOperation) -> Result<(), IngestError>;

    /// Called once per processed operation.
    async fn on_complete(&self, op: PinOperation, status: PinStatus);
}

/// Sending half of the queue.
#[derive(Clone, Debug)]
pub struct PinQueue {
    tx: mpsc::UnboundedSender<PinOperation>,
    depth: Arc<AtomicUsize>,
}

/// Receiving half, turned into a worker pool by [`PinWorkers::spawn`].
#[derive(Debug)]
pub struct PinWorkers {
    rx: mpsc::UnboundedReceiver<PinOperation>,
    depth: Arc<AtomicUsize>,
}

impl PinQueue {
    pub fn new() -> (Self, PinWorkers) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                depth: depth.clone(),
            },
            PinWorkers { rx, depth },
        )
    }

    /// Admit an operation. Callers must not enqueue content that is already
    /// queued or being processed.
    pub fn enqueue(&self, op: PinOperation) {
        let content = op.content;
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(op).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            warn!(content, "pin workers stopped, dropping operation");
            return;
        }
        metrics::PINS_QUEUED.inc();
        metrics::PIN_QUEUE_DEPTH.inc();
    }

    /// Operations queued or in progress.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PinWorkers {
    /// Run at most `concurrency` operations at a time until the queue closes.
    pub fn spawn(self, processor: Arc<dyn PinProcessor>, concurrency: usize) -> JoinHandle<()> {
        let PinWorkers { mut rx, depth } = self;
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let processor = processor.clone();
                let depth = depth.clone();
                let span = info_span!("pin", content = op.content, root = %op.root);

                tokio::spawn(
                    async move {
                        let started = Instant::now();
                        let status = match processor.process(&op).await {
                            Ok(()) => PinStatus::Pinned,
                            Err(e) => {
                                warn!(error = %e, "pinning failed");
                                PinStatus::Failed
                            }
                        };
                        metrics::PIN_DURATION.observe(started.elapsed().as_secs_f64());
                        debug!(status = %status, "pin operation finished");

                        processor.on_complete(op, status).await;
                        depth.fetch_sub(1, Ordering::SeqCst);
                        metrics::PIN_QUEUE_DEPTH.dec();
                        drop(permit);
                    }
                    .instrument(span),
                );
            }
        })
    }
}
