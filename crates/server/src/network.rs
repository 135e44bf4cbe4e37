//! Peer-to-peer collaborators.
//!
//! Block exchange, content routing and data transfer are reached through the
//! [`Network`] and [`DataTransfer`] traits. The binary ships local stand-ins:
//! [`LocalNetwork`] serves this node's identity and cannot fetch remote
//! blocks, and [`UnavailableTransfers`] refuses every transfer.

use async_trait::async_trait;
use shuttle_core::protocol::{AddrInfo, StartTransfer};
use shuttle_core::{Block, ContentAddress, NodeIdentity};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("block not available from the network: {0}")]
    NotFound(String),

    #[error("failed to connect to peer {peer}: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("content routing failed: {0}")]
    Routing(String),

    #[error("data transfer unavailable: {0}")]
    TransferUnavailable(String),
}

#[async_trait]
pub trait Network: Send + Sync + 'static {
    fn peer_id(&self) -> String;

    fn listen_addrs(&self) -> Vec<String>;

    fn addr_info(&self) -> AddrInfo {
        AddrInfo {
            id: self.peer_id(),
            addrs: self.listen_addrs(),
        }
    }

    /// Dial a peer that is expected to hold content we are about to fetch.
    async fn connect(&self, peer: &AddrInfo) -> Result<(), NetworkError>;

    /// Retrieve a block from other peers.
    async fn fetch_block(&self, cid: &ContentAddress) -> Result<Block, NetworkError>;

    /// Advertise that this node provides `cid`.
    async fn provide(&self, cid: &ContentAddress) -> Result<(), NetworkError>;
}

/// A node without a block exchange.
#[derive(Debug)]
pub struct LocalNetwork {
    identity: NodeIdentity,
    listen_addrs: Vec<String>,
}

impl LocalNetwork {
    pub fn new(identity: NodeIdentity, listen_addrs: Vec<String>) -> Self {
        Self {
            identity,
            listen_addrs,
        }
    }
}

#[async_trait]
impl Network for LocalNetwork {
    fn peer_id(&self) -> String {
        self.identity.peer_id()
    }

    fn listen_addrs(&self) -> Vec<String> {
        self.listen_addrs.clone()
    }

    async fn connect(&self, peer: &AddrInfo) -> Result<(), NetworkError> {
        debug!(peer = %peer.id, addrs = ?peer.addrs, "peer hint recorded, no transport to dial");
        Ok(())
    }

    async fn fetch_block(&self, cid: &ContentAddress) -> Result<Block, NetworkError> {
        Err(NetworkError::NotFound(cid.to_string()))
    }

    async fn provide(&self, cid: &ContentAddress) -> Result<(), NetworkError> {
        debug!(cid = %cid, "provide recorded locally");
        Ok(())
    }
}

/// Queues provider announcements for a background task.
///
/// Announcing never blocks ingestion; failures are logged by the task.
#[derive(Clone, Debug)]
pub struct Announcer {
    tx: mpsc::UnboundedSender<ContentAddress>,
}

impl Announcer {
    pub fn spawn(network: Arc<dyn Network>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ContentAddress>();
        tokio::spawn(async move {
            while let Some(cid) = rx.recv().await {
                match network.provide(&cid).await {
                    Ok(()) => info!(cid = %cid, "providing complete"),
                    Err(e) => warn!(cid = %cid, error = %e, "providing failed"),
                }
            }
        });
        Self { tx }
    }

    pub fn announce(&self, cid: ContentAddress) {
        if self.tx.send(cid).is_err() {
            warn!(cid = %cid, "announcer stopped, dropping announcement");
        }
    }
}

/// Opens data-transfer channels for storage deals.
#[async_trait]
pub trait DataTransfer: Send + Sync + 'static {
    /// Start pushing `params.data_cid` to the miner, returning the channel id.
    async fn start_transfer(&self, params: &StartTransfer) -> Result<String, NetworkError>;
}

#[derive(Debug, Default)]
pub struct UnavailableTransfers;

#[async_trait]
impl DataTransfer for UnavailableTransfers {
    async fn start_transfer(&self, params: &StartTransfer) -> Result<String, NetworkError> {
        Err(NetworkError::TransferUnavailable(format!(
            "cannot transfer {} to {}",
            params.data_cid, params.miner
        )))
    }
}
