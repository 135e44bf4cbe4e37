//! Server test utilities.

use shuttle_core::NodeIdentity;
use shuttle_core::config::{AppConfig, MetadataConfig};
use shuttle_core::protocol::{AddrInfo, Hello, Message};
use shuttle_metadata::MetadataStore;
use shuttle_server::ingest::Ingester;
use shuttle_server::network::{LocalNetwork, Network, UnavailableTransfers};
use shuttle_server::pinner::{PinQueue, PinWorkers};
use shuttle_server::rpc::{Outbound, outbound_queue};
use shuttle_server::{AppState, CoordinatorClient, Shuttle, create_router};
use shuttle_storage::{BlockStore, StagingManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

#[allow(dead_code)]
pub const USER_TOKEN: &str = "EST-user-token";

/// A fully wired shuttle over a data directory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestNode {
    pub config: AppConfig,
    pub shuttle: Arc<Shuttle>,
    pub metadata: Arc<dyn MetadataStore>,
    pub blockstore: Arc<dyn BlockStore>,
    pub outbound: Outbound,
    /// Messages bound for the coordinator. Taken by tests that run an RPC client.
    pub rx: Option<UnboundedReceiver<Message>>,
    workers: Option<PinWorkers>,
}

#[allow(dead_code)]
impl TestNode {
    /// Open a node over `datadir` talking to the coordinator at `api_url`.
    ///
    /// Pin workers are not started; call [`TestNode::start_workers`].
    pub async fn open(datadir: &Path, api_url: &str) -> Self {
        Self::open_with(datadir, api_url, |_| {}).await
    }

    /// Open a node with custom config modifications.
    pub async fn open_with<F>(datadir: &Path, api_url: &str, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        config.coordinator.api_url = api_url.to_string();
        config.node.datadir = datadir.to_path_buf();
        config.metadata = MetadataConfig::Sqlite {
            path: datadir.join("shuttle.db"),
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let blockstore = shuttle_storage::from_config(&config.node)
            .await
            .expect("Failed to create block store");
        let staging = StagingManager::new(config.node.staging_path())
            .await
            .expect("Failed to create staging manager");
        let metadata = shuttle_metadata::from_config(&config.metadata)
            .await
            .expect("Failed to create metadata store");
        let network: Arc<dyn Network> = Arc::new(LocalNetwork::new(
            NodeIdentity::generate(),
            config.node.listen_addrs.clone(),
        ));

        let ingester = Arc::new(Ingester::new(
            blockstore.clone(),
            metadata.clone(),
            network.clone(),
            config.pinning.clone(),
        ));
        let (outbound, rx) = outbound_queue();
        let (queue, workers) = PinQueue::new();
        let shuttle = Arc::new(Shuttle::new(
            ingester,
            metadata.clone(),
            Arc::new(staging),
            network,
            Arc::new(UnavailableTransfers),
            outbound.clone(),
            queue,
        ));

        Self {
            config,
            shuttle,
            metadata,
            blockstore,
            outbound,
            rx: Some(rx),
            workers: Some(workers),
        }
    }

    pub fn start_workers(&mut self) {
        let workers = self.workers.take().expect("workers already started");
        workers.spawn(self.shuttle.clone(), self.config.pinning.concurrency);
    }

    /// The HTTP API over this node.
    pub fn router(&self) -> axum::Router {
        let coordinator = CoordinatorClient::new(
            &self.config.coordinator.api_url,
            &self.config.coordinator.handle,
        )
        .expect("Failed to create coordinator client");
        let state = AppState::new(self.config.clone(), coordinator, self.shuttle.clone());
        create_router(state)
    }

    pub fn rx(&mut self) -> &mut UnboundedReceiver<Message> {
        self.rx.as_mut().expect("outbound receiver was taken")
    }

    pub fn take_rx(&mut self) -> UnboundedReceiver<Message> {
        self.rx.take().expect("outbound receiver was taken")
    }

    pub fn staging_path(&self) -> PathBuf {
        self.config.node.staging_path()
    }

    pub fn hello(&self) -> Hello {
        Hello {
            host: self.config.coordinator.host.clone(),
            peer_id: "test-peer".to_string(),
            address: "f1testaddress".to_string(),
            addr_info: AddrInfo {
                id: "test-peer".to_string(),
                addrs: self.config.node.listen_addrs.clone(),
            },
        }
    }
}

/// A node in its own temporary directory.
#[allow(dead_code)]
pub struct TestServer {
    pub node: TestNode,
    pub router: axum::Router,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a started node with temporary storage.
    pub async fn new(api_url: &str) -> Self {
        Self::with_config(api_url, |_| {}).await
    }

    pub async fn with_config<F>(api_url: &str, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut node = TestNode::open_with(temp_dir.path(), api_url, modifier).await;
        node.start_workers();
        let router = node.router();
        Self {
            node,
            router,
            _temp_dir: temp_dir,
        }
    }
}
