//! Control channel to the coordinator.
//!
//! [`RpcClient::run`] keeps one session alive forever: dial, send the hello
//! frame, pump frames, and on any failure wait a fixed delay and dial again.
//! Producers enqueue [`Message`]s through an [`Outbound`] handle at any time;
//! messages queued while disconnected go out after the next hello.

pub mod session;
pub mod transport;

use async_trait::async_trait;
use shuttle_core::config::RpcConfig;
use shuttle_core::protocol::{Command, Hello, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics;
use transport::Connector;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("timed out sending frame")]
    SendTimeout,

    #[error("connection closed")]
    Closed,
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

/// Handles commands received from the coordinator.
///
/// Each command runs on its own task; implementations log their own errors.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, command: Command);
}

/// Producer handle for the outbound queue.
#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
}

impl Outbound {
    pub fn send(&self, message: Message) {
        if let Err(e) = self.tx.send(message) {
            warn!(op = %e.0.op, "rpc client stopped, dropping message");
        }
    }
}

/// Create the outbound queue shared by every session.
pub fn outbound_queue() -> (Outbound, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbound { tx }, rx)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Delays before redialing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// After a dial, handshake or stream failure.
    pub after_error: Duration,
    /// After the coordinator closed the session cleanly.
    pub after_close: Duration,
}

impl From<&RpcConfig> for ReconnectPolicy {
    fn from(config: &RpcConfig) -> Self {
        Self {
            after_error: config.retry_delay(),
            after_close: config.reconnect_delay(),
        }
    }
}

pub struct RpcClient {
    connector: Arc<dyn Connector>,
    hello: Hello,
    policy: ReconnectPolicy,
    send_timeout: Duration,
    state: watch::Sender<SessionState>,
    outbound: Outbound,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Dequeued but not yet written when the last session ended.
    unsent: Option<Message>,
}

impl RpcClient {
    /// `outbound` must be the handle paired with `rx`; the client keeps it so
    /// the queue never closes.
    pub fn new(
        connector: Arc<dyn Connector>,
        hello: Hello,
        config: &RpcConfig,
        outbound: Outbound,
        rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            hello,
            policy: ReconnectPolicy::from(config),
            send_timeout: config.send_timeout(),
            state,
            outbound,
            rx,
            unsent: None,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Keep a session running for the life of the process.
    pub async fn run(mut self, handler: Arc<dyn CommandHandler>) {
        loop {
            self.state.send_replace(SessionState::Connecting);
            let state = &self.state;
            let result = session::run_session(
                self.connector.as_ref(),
                &self.hello,
                &handler,
                &mut self.rx,
                &mut self.unsent,
                self.send_timeout,
                || {
                    state.send_replace(SessionState::Connected);
                },
            )
            .await;
            self.state.send_replace(SessionState::Disconnected);
            metrics::RPC_RECONNECTS.inc();

            let delay = match result {
                Ok(()) => {
                    warn!("rpc session closed without error, reconnecting");
                    self.policy.after_close
                }
                Err(e) => {
                    error!(error = %e, "rpc session failed");
                    self.policy.after_error
                }
            };
            tokio::time::sleep(delay).await;
            info!("reconnecting to coordinator");
        }
    }

    pub fn spawn(self, handler: Arc<dyn CommandHandler>) -> JoinHandle<()> {
        tokio::spawn(self.run(handler))
    }
}
