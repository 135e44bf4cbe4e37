//! A single control-channel connection.

use futures::{SinkExt, StreamExt};
use shuttle_core::protocol::{Command, Hello, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::transport::{Connector, FrameSink, FrameStream};
use super::{CommandHandler, RpcError};
use crate::metrics;

/// Dial, send `hello`, then pump frames until either direction fails.
///
/// Inbound commands are each handled on their own task. Outbound messages
/// are written one at a time, starting with any `unsent` message left by the
/// previous session; a write that misses `send_timeout` is dropped and the
/// session continues. Returns `Ok(())` when the coordinator closes
/// the connection cleanly.
pub(crate) async fn run_session(
    connector: &dyn Connector,
    hello: &Hello,
    handler: &Arc<dyn CommandHandler>,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    unsent: &mut Option<Message>,
    send_timeout: Duration,
    on_connected: impl FnOnce(),
) -> Result<(), RpcError> {
    let (mut sink, stream) = connector.connect().await?;

    let frame = serde_json::to_string(hello)?;
    timeout(send_timeout, sink.send(frame))
        .await
        .map_err(|_| RpcError::SendTimeout)??;
    info!(peer_id = %hello.peer_id, host = %hello.host, "sent hello to coordinator");
    on_connected();

    tokio::select! {
        result = read_loop(stream, handler) => result,
        result = write_loop(&mut sink, outbound, unsent, send_timeout) => result,
    }
}

async fn read_loop(
    mut stream: FrameStream,
    handler: &Arc<dyn CommandHandler>,
) -> Result<(), RpcError> {
    while let Some(frame) = stream.next().await {
        let command: Command = serde_json::from_str(&frame?)?;
        debug!(op = %command.op, "received command");
        let handler = handler.clone();
        tokio::spawn(async move { handler.handle(command).await });
    }
    Ok(())
}

/// The message being written stays in `unsent` until the sink accepts it or
/// its deadline passes, so a session that ends mid-write leaves it for the
/// next one.
async fn write_loop(
    sink: &mut FrameSink,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    unsent: &mut Option<Message>,
    send_timeout: Duration,
) -> Result<(), RpcError> {
    loop {
        if unsent.is_none() {
            let Some(message) = outbound.recv().await else {
                break;
            };
            *unsent = Some(message);
        }
        let Some(message) = unsent.as_ref() else {
            continue;
        };
        let op = message.op.clone();
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%op, error = %e, "failed to encode message, dropping");
                metrics::RPC_MESSAGES_DROPPED.inc();
                *unsent = None;
                continue;
            }
        };
        match timeout(send_timeout, sink.send(frame)).await {
            Ok(Ok(())) => metrics::RPC_MESSAGES_SENT.inc(),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(%op, "failed to send message before deadline, dropping");
                metrics::RPC_MESSAGES_DROPPED.inc();
            }
        }
        *unsent = None;
    }
    // every sender is gone; nothing more will be written
    std::future::pending::<()>().await;
    Ok(())
}
