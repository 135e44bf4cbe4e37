//! The shuttle's pin state machine and command handling.
//!
//! [`Shuttle`] decides when a pin changes state. Uploads are pinned inline
//! from their staging area; coordinator commands and restored pins go through
//! the [`PinQueue`], whose workers call back into [`PinProcessor`]. Every
//! status change is reported to the coordinator through the outbound queue.

use async_trait::async_trait;
use shuttle_core::protocol::{
    AddPin, ChannelState, ChannelStatus, Command, Message, PinComplete, PinObject, Request,
    StartTransfer,
};
use shuttle_core::{ContentAddress, PinStatus};
use shuttle_metadata::{
    MetadataError, MetadataStore, NewPin, ObjectRepo, ObjectRow, PinRepo, PinRow,
};
use shuttle_storage::{BlockStore, StagingId, StagingManager};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::ingest::{IngestError, IngestResult, Ingester, Reclaimed, WalkSummary, migrate};
use crate::metrics;
use crate::network::{Announcer, DataTransfer, Network};
use crate::pinner::{PinOperation, PinProcessor, PinQueue};
use crate::rpc::{CommandHandler, Outbound};
use crate::tracker::ChannelTracker;

pub struct Shuttle {
    metadata: Arc<dyn MetadataStore>,
    ingester: Arc<Ingester>,
    staging: Arc<StagingManager>,
    network: Arc<dyn Network>,
    announcer: Announcer,
    transfers: Arc<dyn DataTransfer>,
    tracker: ChannelTracker,
    outbound: Outbound,
    queue: PinQueue,
}

impl Shuttle {
    pub fn new(
        ingester: Arc<Ingester>,
        metadata: Arc<dyn MetadataStore>,
        staging: Arc<StagingManager>,
        network: Arc<dyn Network>,
        transfers: Arc<dyn DataTransfer>,
        outbound: Outbound,
        queue: PinQueue,
    ) -> Self {
        let announcer = Announcer::spawn(network.clone());
        Self {
            metadata,
            ingester,
            staging,
            network,
            announcer,
            transfers,
            tracker: ChannelTracker::new(),
            outbound,
            queue,
        }
    }

    pub fn ingester(&self) -> &Arc<Ingester> {
        &self.ingester
    }

    pub fn staging(&self) -> &Arc<StagingManager> {
        &self.staging
    }

    pub fn queue(&self) -> &PinQueue {
        &self.queue
    }

    pub fn tracker(&self) -> &ChannelTracker {
        &self.tracker
    }

    /// Re-enqueue every pin a previous process left mid-flight.
    ///
    /// Peer hints and replacement targets are not persisted, so restored
    /// operations carry neither. Returns how many pins were enqueued.
    #[instrument(skip(self))]
    pub async fn restore_on_startup(&self) -> IngestResult<usize> {
        let pins = self.metadata.list_pins_to_restore().await?;
        let mut restored = 0;
        for pin in pins {
            let root = match pin.content_address() {
                Ok(root) => root,
                Err(e) => {
                    error!(content = pin.content, error = %e, "cannot restore pin with unparsable address");
                    continue;
                }
            };
            self.queue.enqueue(PinOperation {
                content: pin.content,
                user_id: pin.user_id,
                root,
                peers: Vec::new(),
                replace: None,
            });
            restored += 1;
        }
        info!(restored, "restored in-flight pins");
        Ok(restored)
    }

    /// Record a freshly uploaded DAG and move it to permanent storage.
    ///
    /// The pin is created, walked from `staging`, reported with
    /// `PinComplete`, migrated and announced. A failure after the pin row
    /// exists marks it failed.
    #[instrument(skip(self, staging), fields(root = %root))]
    pub async fn pin_upload(
        &self,
        content: i64,
        user_id: i64,
        root: ContentAddress,
        staging: &dyn BlockStore,
    ) -> IngestResult<PinRow> {
        let pin = self
            .metadata
            .create_pin(&NewPin {
                content,
                cid: root,
                user_id,
            })
            .await?;

        let result = async {
            let summary = self.ingester.walk_and_record(root, &pin, staging).await?;
            self.send_pin_complete(content, &summary);
            migrate(
                staging,
                self.ingester.blockstore().as_ref(),
                self.ingester.config().migrate_batch_size,
            )
            .await?;
            Ok::<_, IngestError>(())
        }
        .await;

        if let Err(e) = result {
            warn!(content, error = %e, "failed to pin upload");
            self.on_pin_status(content, PinStatus::Failed).await;
            return Err(e);
        }

        metrics::PINS_COMPLETED.inc();
        self.announcer.announce(root);
        Ok(pin)
    }

    /// Remove a staging area in the background.
    pub fn schedule_cleanup(&self, id: StagingId) {
        let staging = self.staging.clone();
        tokio::spawn(async move {
            if let Err(e) = staging.clean_up(id).await {
                warn!(staging = %id, error = %e, "failed to clean up staging area");
            }
        });
    }

    /// Persist and report a terminal status reported for `content`.
    pub async fn on_pin_status(&self, content: i64, status: PinStatus) {
        if status == PinStatus::Failed {
            metrics::PINS_FAILED.inc();
            if let Err(e) = self.metadata.mark_pin_failed(content).await {
                error!(content, error = %e, "failed to mark pin as failed");
            }
        }
        self.outbound
            .send(Message::update_pin_status(content, status));
    }

    /// Feed a transfer event from the data-transfer subsystem.
    pub fn on_transfer_event(&self, channel: &str, state: &ChannelState) {
        if let Some(change) = self.tracker.observe(channel, state) {
            debug!(channel, status = ?change.state.status, "transfer status changed");
            metrics::TRANSFER_STATUS_UPDATES.inc();
            self.outbound.send(Message::transfer_status(change.into()));
        }
    }

    /// Delete a pin and reclaim its unshared objects.
    pub async fn unpin(&self, content: i64) -> IngestResult<Reclaimed> {
        self.ingester.unpin(content).await
    }

    fn send_pin_complete(&self, content: i64, summary: &WalkSummary) {
        self.outbound.send(Message::pin_complete(PinComplete {
            db_id: content,
            size: summary.total_size,
            objects: summary.pin_objects(),
        }));
    }

    #[instrument(skip(self, req), fields(content = req.db_id, cid = %req.cid))]
    async fn add_pin(&self, req: AddPin) -> IngestResult<()> {
        if let Some(pin) = self.metadata.get_pin_by_content(req.db_id).await? {
            if pin.active {
                // the coordinator lost track of it; tell it again
                let objects = self.metadata.objects_for_pin(pin.id).await?;
                self.outbound.send(Message::pin_complete(PinComplete {
                    db_id: pin.content,
                    size: u64::try_from(pin.size).unwrap_or_default(),
                    objects: to_pin_objects(&objects),
                }));
                return Ok(());
            }
            info!(status = %pin.status(), "pin already exists, skipping");
            return Ok(());
        }

        match self
            .metadata
            .create_pin(&NewPin {
                content: req.db_id,
                cid: req.cid,
                user_id: req.user_id,
            })
            .await
        {
            Ok(_) => {}
            Err(MetadataError::AlreadyExists(_)) => {
                debug!("pin created concurrently, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.queue.enqueue(PinOperation {
            content: req.db_id,
            user_id: req.user_id,
            root: req.cid,
            peers: req.peers,
            replace: None,
        });
        Ok(())
    }

    #[instrument(skip(self, req), fields(deal = req.deal_db_id, content = req.content_id))]
    async fn start_transfer(&self, req: StartTransfer) {
        let channel = match self.transfers.start_transfer(&req).await {
            Ok(channel) => channel,
            Err(e) => {
                error!(miner = %req.miner, error = %e, "failed to start data transfer");
                return;
            }
        };
        self.tracker.track(&channel, req.deal_db_id);
        info!(channel = %channel, "data transfer started");
        self.on_transfer_event(&channel, &ChannelState::new(ChannelStatus::Requested));
    }
}

fn to_pin_objects(objects: &[ObjectRow]) -> Vec<PinObject> {
    objects
        .iter()
        .filter_map(|o| match o.content_address() {
            Ok(cid) => Some(PinObject {
                cid,
                size: u64::try_from(o.size).unwrap_or_default(),
            }),
            Err(e) => {
                warn!(object = o.id, error = %e, "skipping object with unparsable address");
                None
            }
        })
        .collect()
}

#[async_trait]
impl PinProcessor for Shuttle {
    async fn process(&self, op: &PinOperation) -> Result<(), IngestError> {
        for peer in &op.peers {
            if let Err(e) = self.network.connect(peer).await {
                warn!(peer = %peer.id, error = %e, "failed to connect to peer hint");
            }
        }

        let pin = self
            .metadata
            .get_pin_by_content(op.content)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("pin for content {}", op.content)))?;

        let blockstore = self.ingester.blockstore().clone();
        let summary = self
            .ingester
            .walk_and_record(op.root, &pin, blockstore.as_ref())
            .await?;
        self.send_pin_complete(op.content, &summary);
        self.announcer.announce(op.root);
        Ok(())
    }

    async fn on_complete(&self, op: PinOperation, status: PinStatus) {
        if status == PinStatus::Pinned {
            metrics::PINS_COMPLETED.inc();
        }
        self.on_pin_status(op.content, status).await;

        if status == PinStatus::Pinned
            && let Some(old) = op.replace
        {
            if let Err(e) = self.unpin(old).await {
                error!(content = old, error = %e, "failed to unpin replaced content");
            }
        }
    }
}

#[async_trait]
impl CommandHandler for Shuttle {
    async fn handle(&self, command: Command) {
        let op = command.op.clone();
        let request = match command.into_request() {
            Ok(request) => request,
            Err(e) => {
                error!(op = %op, error = %e, "failed to handle command");
                return;
            }
        };

        match request {
            Request::AddPin(req) => {
                let content = req.db_id;
                if let Err(e) = self.add_pin(req).await {
                    error!(content, error = %e, "failed to add pin");
                }
            }
            Request::TakeContent(req) => {
                for item in req.contents {
                    let content = item.db_id;
                    if let Err(e) = self.add_pin(item).await {
                        error!(content, error = %e, "failed to take content");
                    }
                }
            }
            Request::UnpinContent(req) => {
                for content in req.contents {
                    if let Err(e) = self.unpin(content).await {
                        error!(content, error = %e, "failed to unpin content");
                    }
                }
            }
            Request::StartTransfer(req) => self.start_transfer(req).await,
        }
    }
}
