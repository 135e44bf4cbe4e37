//! Frame transports for the control channel.
//!
//! A [`Connector`] dials the coordinator and hands back a text-frame sink and
//! stream. [`WebSocketConnector`] is the production transport; the
//! [`memory`] module provides an in-process pair for tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use url::Url;

use super::RpcError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = RpcError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<String, RpcError>>;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to the coordinator.
    async fn connect(&self) -> Result<(FrameSink, FrameStream), RpcError>;
}

/// Websocket connection authenticated with the shuttle's bearer token.
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: Url,
    token: String,
}

impl WebSocketConnector {
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        Self {
            url,
            token: token.into(),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), RpcError> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| RpcError::Connect(format!("invalid auth token: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _response) = connect_async(request).await?;
        let (sink, stream) = ws.split();

        let sink = sink
            .with(|frame: String| async move {
                Ok::<_, tokio_tungstenite::tungstenite::Error>(WsMessage::text(frame))
            })
            .sink_map_err(RpcError::from);

        let stream = stream.filter_map(|message| async move {
            match message {
                Ok(WsMessage::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(WsMessage::Binary(data)) => Some(
                    String::from_utf8(data.to_vec())
                        .map_err(|e| RpcError::Decode(format!("non-utf8 frame: {e}"))),
                ),
                Ok(WsMessage::Close(_)) => None,
                Ok(_) => None,
                Err(e) => Some(Err(RpcError::from(e))),
            }
        });

        Ok((Box::pin(sink), stream.boxed()))
    }
}

/// In-process transport.
///
/// Each successful `connect` hands the coordinator's end of the connection to
/// the paired [`memory::Coordinator`].
pub mod memory {
    use super::*;
    use futures::channel::mpsc as frames;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Mutex, mpsc};

    /// The coordinator's side of one connection.
    #[derive(Debug)]
    pub struct Peer {
        /// Frames written by the shuttle.
        pub inbound: frames::UnboundedReceiver<String>,
        /// Frames delivered to the shuttle.
        pub outbound: frames::UnboundedSender<String>,
    }

    impl Peer {
        pub async fn recv(&mut self) -> Option<String> {
            self.inbound.next().await
        }

        pub fn send(&self, frame: impl Into<String>) -> bool {
            self.outbound.unbounded_send(frame.into()).is_ok()
        }
    }

    #[derive(Clone, Debug)]
    pub struct MemoryConnector {
        accepted: mpsc::UnboundedSender<Peer>,
        refusals: Arc<AtomicUsize>,
    }

    /// Accepts connections made through a [`MemoryConnector`].
    #[derive(Debug)]
    pub struct Coordinator {
        accepted: Mutex<mpsc::UnboundedReceiver<Peer>>,
        refusals: Arc<AtomicUsize>,
    }

    pub fn pair() -> (MemoryConnector, Coordinator) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refusals = Arc::new(AtomicUsize::new(0));
        (
            MemoryConnector {
                accepted: tx,
                refusals: refusals.clone(),
            },
            Coordinator {
                accepted: Mutex::new(rx),
                refusals,
            },
        )
    }

    impl Coordinator {
        /// Wait for the next connection.
        pub async fn accept(&self) -> Option<Peer> {
            self.accepted.lock().await.recv().await
        }

        /// Fail the next `n` dial attempts.
        pub fn refuse_next(&self, n: usize) {
            self.refusals.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self) -> Result<(FrameSink, FrameStream), RpcError> {
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(RpcError::Connect("connection refused".to_string()));
            }

            let (to_coordinator, inbound) = frames::unbounded();
            let (outbound, from_coordinator) = frames::unbounded();
            self.accepted
                .send(Peer { inbound, outbound })
                .map_err(|_| RpcError::Connect("coordinator is gone".to_string()))?;

            let sink = to_coordinator.sink_map_err(|_| RpcError::Closed);
            let stream = from_coordinator.map(Ok::<_, RpcError>);
            Ok((Box::pin(sink), stream.boxed()))
        }
    }
}
