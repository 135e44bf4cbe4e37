//! Periodic node-state snapshots for the coordinator.

use shuttle_core::protocol::{Message, ShuttleUpdate};
use shuttle_metadata::{MetadataError, MetadataStore, PinRepo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::pinner::PinQueue;
use crate::rpc::Outbound;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read disk usage of {path}: {source}")]
    Disk {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to count pins: {0}")]
    Metadata(#[from] MetadataError),

    #[error("disk usage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct Reporter {
    queue: PinQueue,
    metadata: Arc<dyn MetadataStore>,
    blockstore_path: PathBuf,
    outbound: Outbound,
    interval: Duration,
}

impl Reporter {
    pub fn new(
        queue: PinQueue,
        metadata: Arc<dyn MetadataStore>,
        blockstore_path: PathBuf,
        outbound: Outbound,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            metadata,
            blockstore_path,
            outbound,
            interval,
        }
    }

    /// Gather the current queue depth, disk usage and active pin count.
    pub async fn snapshot(&self) -> Result<ShuttleUpdate, ReportError> {
        let path = self.blockstore_path.clone();
        let (total, free) = tokio::task::spawn_blocking(move || {
            let total = fs2::total_space(&path)?;
            let free = fs2::available_space(&path)?;
            Ok::<_, std::io::Error>((total, free))
        })
        .await?
        .map_err(|source| ReportError::Disk {
            path: self.blockstore_path.display().to_string(),
            source,
        })?;

        let num_pins = self.metadata.count_active_pins().await?;

        Ok(ShuttleUpdate {
            pin_queue_size: self.queue.len() as u64,
            blockstore_size: total,
            blockstore_free: free,
            num_pins,
        })
    }

    /// Send a snapshot now and then once per interval, forever.
    ///
    /// A snapshot that cannot be gathered is logged and skipped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.snapshot().await {
                    Ok(update) => {
                        debug!(
                            pin_queue_size = update.pin_queue_size,
                            blockstore_free = update.blockstore_free,
                            num_pins = update.num_pins,
                            "sending shuttle update"
                        );
                        self.outbound.send(Message::shuttle_update(update));
                    }
                    Err(e) => warn!(error = %e, "failed to gather shuttle update"),
                }
            }
        })
    }
}
