//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// HTTP listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3005").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted upload body in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Log every HTTP request through the trace layer.
    #[serde(default)]
    pub request_logging: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3005".to_string()
}

fn default_max_upload_bytes() -> u64 {
    32 * 1024 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            metrics_enabled: default_metrics_enabled(),
            request_logging: false,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Where the coordinator lives and how this node identifies itself to it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Base URL of the coordinator HTTP API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Control-channel endpoint. Derived from `api_url` when unset.
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Shuttle auth token issued by the coordinator.
    /// WARNING: Prefer SHUTTLE_COORDINATOR__AUTH_TOKEN over storing it in config.
    pub auth_token: String,
    /// Handle the coordinator knows this shuttle by.
    pub handle: String,
    /// Public URL clients can reach this node on.
    #[serde(default)]
    pub host: String,
}

fn default_api_url() -> String {
    "https://api.estuary.tech".to_string()
}

impl CoordinatorConfig {
    /// Control-channel URL: `rpc_url` if given, otherwise `api_url` with a
    /// websocket scheme and the `/shuttle/conn` path.
    pub fn rpc_endpoint(&self) -> Result<Url, String> {
        if let Some(rpc) = &self.rpc_url {
            return Url::parse(rpc).map_err(|e| format!("coordinator.rpc_url: {e}"));
        }

        let mut url =
            Url::parse(&self.api_url).map_err(|e| format!("coordinator.api_url: {e}"))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(format!("coordinator.api_url has unsupported scheme {other}")),
        };
        url.set_scheme(scheme)
            .map_err(|_| "coordinator.api_url cannot be converted to a websocket url".to_string())?;
        url.set_path("/shuttle/conn");
        Ok(url)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.auth_token.is_empty() {
            return Err("coordinator.auth_token is required".to_string());
        }
        if self.handle.is_empty() {
            return Err("coordinator.handle is required".to_string());
        }
        Url::parse(&self.api_url).map_err(|e| format!("coordinator.api_url: {e}"))?;
        self.rpc_endpoint().map(|_| ())
    }
}

/// Local node layout and identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Base directory for relative paths below.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    /// Permanent block storage directory.
    #[serde(default = "default_blockstore")]
    pub blockstore: PathBuf,
    /// Root for per-upload staging areas.
    #[serde(default = "default_staging")]
    pub staging: PathBuf,
    /// Ed25519 key file, created on first start.
    #[serde(default = "default_peer_key")]
    pub peer_key: PathBuf,
    /// Multiaddrs announced in the hello frame.
    #[serde(default = "default_listen_addrs")]
    pub listen_addrs: Vec<String>,
    /// Default settlement address reported to the coordinator.
    #[serde(default)]
    pub settlement_address: Option<String>,
}

fn default_datadir() -> PathBuf {
    PathBuf::from(".")
}

fn default_blockstore() -> PathBuf {
    PathBuf::from("blocks")
}

fn default_staging() -> PathBuf {
    PathBuf::from("staging")
}

fn default_peer_key() -> PathBuf {
    PathBuf::from("peer.key")
}

fn default_listen_addrs() -> Vec<String> {
    vec!["/ip4/0.0.0.0/tcp/6745".to_string()]
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            blockstore: default_blockstore(),
            staging: default_staging(),
            peer_key: default_peer_key(),
            listen_addrs: default_listen_addrs(),
            settlement_address: None,
        }
    }
}

impl NodeConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.datadir.join(path)
        }
    }

    pub fn blockstore_path(&self) -> PathBuf {
        self.resolve(&self.blockstore)
    }

    pub fn staging_path(&self) -> PathBuf {
        self.resolve(&self.staging)
    }

    pub fn peer_key_path(&self) -> PathBuf {
        self.resolve(&self.peer_key)
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Advisory query timeout in seconds. Slow queries are logged, not cancelled.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/shuttle.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Pin queue and ingestion tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PinningConfig {
    /// Workers draining the pin queue.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Fixed splitter chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum children per link node.
    #[serde(default = "default_max_links")]
    pub max_links: usize,
    #[serde(default = "default_object_batch_size")]
    pub object_batch_size: usize,
    #[serde(default = "default_ref_batch_size")]
    pub ref_batch_size: usize,
    #[serde(default = "default_migrate_batch_size")]
    pub migrate_batch_size: usize,
    /// Concurrent block fetches during a DAG walk.
    #[serde(default = "default_walk_concurrency")]
    pub walk_concurrency: usize,
}

fn default_concurrency() -> usize {
    100
}

fn default_chunk_size() -> usize {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_links() -> usize {
    crate::DEFAULT_MAX_LINKS
}

fn default_object_batch_size() -> usize {
    300
}

fn default_ref_batch_size() -> usize {
    500
}

fn default_migrate_batch_size() -> usize {
    500
}

fn default_walk_concurrency() -> usize {
    32
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            max_links: default_max_links(),
            object_batch_size: default_object_batch_size(),
            ref_batch_size: default_ref_batch_size(),
            migrate_batch_size: default_migrate_batch_size(),
            walk_concurrency: default_walk_concurrency(),
        }
    }
}

impl PinningConfig {
    pub fn import_params(&self) -> crate::importer::ImportParams {
        crate::importer::ImportParams {
            chunk_size: self.chunk_size,
            max_links: self.max_links,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("concurrency", self.concurrency),
            ("object_batch_size", self.object_batch_size),
            ("ref_batch_size", self.ref_batch_size),
            ("migrate_batch_size", self.migrate_batch_size),
            ("walk_concurrency", self.walk_concurrency),
        ] {
            if value == 0 {
                return Err(format!("pinning.{name} cannot be 0"));
            }
        }
        self.import_params()
            .validate()
            .map_err(|e| format!("pinning: {e}"))
    }
}

/// Control-channel timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Deadline for writing one outbound frame.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Delay before redialing after a failed session.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Delay before redialing after a session ended without error.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Interval between shuttle updates.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_reconnect_delay_secs() -> u64 {
    1
}

fn default_update_interval_secs() -> u64 {
    60
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            update_interval_secs: default_update_interval_secs(),
        }
    }
}

impl RpcConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.send_timeout_secs == 0 {
            return Err("rpc.send_timeout_secs cannot be 0".to_string());
        }
        // tokio::time::interval panics on a zero period
        if self.update_interval_secs == 0 {
            return Err("rpc.update_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Coordinator connection (required).
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub pinning: PinningConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Points the coordinator at localhost and uses a
    /// dummy token and settlement address.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            coordinator: CoordinatorConfig {
                api_url: "http://127.0.0.1:3004".to_string(),
                rpc_url: None,
                auth_token: "SECRET-test-shuttle-token".to_string(),
                handle: "SHUTTLE-test-handle".to_string(),
                host: "http://127.0.0.1:3005".to_string(),
            },
            node: NodeConfig {
                settlement_address: Some("f1testaddress".to_string()),
                ..NodeConfig::default()
            },
            metadata: MetadataConfig::default(),
            pinning: PinningConfig::default(),
            rpc: RpcConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.coordinator.validate()?;
        self.pinning.validate()?;
        self.rpc.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinning_defaults() {
        let config = PinningConfig::default();
        assert_eq!(config.concurrency, 100);
        assert_eq!(config.chunk_size, 256 * 1024);
        assert_eq!(config.object_batch_size, 300);
        assert_eq!(config.ref_batch_size, 500);
        assert_eq!(config.migrate_batch_size, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rpc_defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.send_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_delay(), Duration::from_secs(10));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.update_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_rpc_endpoint_derived_from_api_url() {
        let mut config = AppConfig::for_testing().coordinator;
        config.api_url = "https://api.estuary.tech".to_string();
        assert_eq!(
            config.rpc_endpoint().unwrap().as_str(),
            "wss://api.estuary.tech/shuttle/conn"
        );

        config.api_url = "http://localhost:3004/".to_string();
        assert_eq!(
            config.rpc_endpoint().unwrap().as_str(),
            "ws://localhost:3004/shuttle/conn"
        );

        config.rpc_url = Some("ws://10.0.0.1:9999/custom".to_string());
        assert_eq!(
            config.rpc_endpoint().unwrap().as_str(),
            "ws://10.0.0.1:9999/custom"
        );
    }

    #[test]
    fn test_pinning_validate_rejects_zero_and_bad_chunking() {
        let config = PinningConfig {
            ref_batch_size: 0,
            ..PinningConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("ref_batch_size"));

        let config = PinningConfig {
            chunk_size: 4 * 1024 * 1024,
            ..PinningConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PinningConfig {
            max_links: 1,
            ..PinningConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_paths_resolve_under_datadir() {
        let node = NodeConfig {
            datadir: PathBuf::from("/var/lib/shuttle"),
            blockstore: PathBuf::from("/mnt/blocks"),
            ..NodeConfig::default()
        };
        assert_eq!(node.blockstore_path(), PathBuf::from("/mnt/blocks"));
        assert_eq!(node.staging_path(), PathBuf::from("/var/lib/shuttle/staging"));
        assert_eq!(node.peer_key_path(), PathBuf::from("/var/lib/shuttle/peer.key"));
    }

    #[test]
    fn test_coordinator_requires_token_and_handle() {
        let mut config = AppConfig::for_testing();
        assert!(config.validate().is_ok());

        config.coordinator.auth_token.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let json = r#"{"coordinator":{"auth_token":"t","handle":"h"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3005");
        assert_eq!(config.coordinator.api_url, "https://api.estuary.tech");
        assert!(config.node.settlement_address.is_none());
        assert!(matches!(config.metadata, MetadataConfig::Sqlite { .. }));
    }
}
