//! Shuttle server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use shuttle_core::NodeIdentity;
use shuttle_core::config::AppConfig;
use shuttle_core::protocol::Hello;
use shuttle_server::ingest::Ingester;
use shuttle_server::network::{LocalNetwork, Network, UnavailableTransfers};
use shuttle_server::pinner::PinQueue;
use shuttle_server::reporter::Reporter;
use shuttle_server::rpc::transport::WebSocketConnector;
use shuttle_server::rpc::{RpcClient, outbound_queue};
use shuttle_server::{AppState, CoordinatorClient, Shuttle, create_router};
use shuttle_storage::StagingManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shuttle - a storage node that ingests, pins and reports to its coordinator
#[derive(Parser, Debug)]
#[command(name = "shuttle")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SHUTTLE_CONFIG",
        default_value = "config/shuttle.toml"
    )]
    config: String,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // SHUTTLE_CONFIG is only the path
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("SHUTTLE_") && key != "SHUTTLE_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: shuttle --config /path/to/shuttle.toml\n  \
             2. Environment variables: SHUTTLE_COORDINATOR__AUTH_TOKEN=SECRET \
             SHUTTLE_COORDINATOR__HANDLE=SHUTTLE-HANDLE \
             SHUTTLE_NODE__SETTLEMENT_ADDRESS=f1... shuttle\n\n\
             See config/shuttle.example.toml for example configuration.\n\
             Set SHUTTLE_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SHUTTLE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Shuttle v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let settlement_address = config
        .node
        .settlement_address
        .clone()
        .filter(|a| !a.is_empty())
        .context("node.settlement_address is required")?;

    shuttle_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Storage
    let blockstore = shuttle_storage::from_config(&config.node)
        .await
        .context("failed to initialize block storage")?;
    let staging = StagingManager::new(config.node.staging_path())
        .await
        .context("failed to initialize staging storage")?;
    match staging.clean_stale().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Removed stale staging areas"),
        Err(e) => tracing::warn!(error = %e, "Failed to clean stale staging areas"),
    }
    tracing::info!(
        blockstore = %config.node.blockstore_path().display(),
        staging = %config.node.staging_path().display(),
        "Block storage initialized"
    );

    let metadata = shuttle_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    // Identity and network
    let identity = NodeIdentity::load_or_generate(&config.node.peer_key_path())
        .context("failed to load node identity")?;
    let network: Arc<dyn Network> = Arc::new(LocalNetwork::new(
        identity,
        config.node.listen_addrs.clone(),
    ));
    tracing::info!(peer_id = %network.peer_id(), "Node identity loaded");

    // Pin state machine
    let ingester = Arc::new(Ingester::new(
        blockstore,
        metadata.clone(),
        network.clone(),
        config.pinning.clone(),
    ));
    let (outbound, outbound_rx) = outbound_queue();
    let (queue, workers) = PinQueue::new();
    let shuttle = Arc::new(Shuttle::new(
        ingester,
        metadata.clone(),
        Arc::new(staging),
        network.clone(),
        Arc::new(UnavailableTransfers),
        outbound.clone(),
        queue.clone(),
    ));

    shuttle
        .restore_on_startup()
        .await
        .context("failed to restore in-flight pins")?;
    workers.spawn(shuttle.clone(), config.pinning.concurrency);

    // Control channel
    let rpc_url = config
        .coordinator
        .rpc_endpoint()
        .map_err(|e| anyhow::anyhow!(e))?;
    let hello = Hello {
        host: config.coordinator.host.clone(),
        peer_id: network.peer_id(),
        address: settlement_address,
        addr_info: network.addr_info(),
    };
    tracing::info!(rpc_url = %rpc_url, "Connecting to coordinator");
    RpcClient::new(
        Arc::new(WebSocketConnector::new(
            rpc_url,
            config.coordinator.auth_token.clone(),
        )),
        hello,
        &config.rpc,
        outbound.clone(),
        outbound_rx,
    )
    .spawn(shuttle.clone());

    Reporter::new(
        queue,
        metadata,
        config.node.blockstore_path(),
        outbound,
        config.rpc.update_interval(),
    )
    .spawn();

    // HTTP API
    let coordinator =
        CoordinatorClient::new(&config.coordinator.api_url, &config.coordinator.handle)
            .context("failed to create coordinator client")?;
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, coordinator, shuttle);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
