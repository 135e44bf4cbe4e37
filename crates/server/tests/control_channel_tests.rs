//! Integration tests for the coordinator control channel.
//!
//! The coordinator end is an in-memory transport; the shuttle runs with its
//! real block store, metadata store and pin workers.

mod common;

use common::{TestNode, eventually, seeded_bytes};
use shuttle_core::protocol::{
    AddPin, CMD_ADD_PIN, CMD_UNPIN_CONTENT, CmdParams, Command, Hello, Message, OP_PIN_COMPLETE,
    OP_SHUTTLE_UPDATE, OP_UPDATE_PIN_STATUS, UnpinContent,
};
use shuttle_core::{Block, ContentAddress, DagBuilder, ImportParams, PinStatus};
use shuttle_metadata::{NewPin, ObjectRepo, PinRepo};
use shuttle_server::reporter::Reporter;
use shuttle_server::rpc::transport::memory::{self, Coordinator, Peer};
use shuttle_server::rpc::{ReconnectPolicy, RpcClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const SMALL_DAG: ImportParams = ImportParams {
    chunk_size: 1024,
    max_links: 4,
};

/// Connect `node` to an in-memory coordinator and return it.
fn connect(node: &mut TestNode) -> Coordinator {
    let (connector, coordinator) = memory::pair();
    let rx = node.take_rx();
    RpcClient::new(
        Arc::new(connector),
        node.hello(),
        &node.config.rpc,
        node.outbound.clone(),
        rx,
    )
    .with_policy(ReconnectPolicy {
        after_error: Duration::from_millis(200),
        after_close: Duration::from_millis(100),
    })
    .spawn(node.shuttle.clone());
    coordinator
}

async fn accept(coordinator: &Coordinator) -> Peer {
    let mut peer = timeout(Duration::from_secs(5), coordinator.accept())
        .await
        .expect("shuttle did not connect")
        .expect("connector dropped");
    let first = recv_frame(&mut peer).await;
    assert!(
        serde_json::from_str::<Hello>(&first).is_ok(),
        "first frame was not a hello: {first}"
    );
    peer
}

async fn recv_frame(peer: &mut Peer) -> String {
    timeout(Duration::from_secs(10), peer.recv())
        .await
        .expect("no frame within 10s")
        .expect("connection closed")
}

/// Read frames until one carries `op`.
async fn recv_op(peer: &mut Peer, op: &str) -> Message {
    loop {
        let message: Message = serde_json::from_str(&recv_frame(peer).await).unwrap();
        if message.op == op {
            return message;
        }
    }
}

fn add_pin(content: i64, cid: ContentAddress) -> String {
    let command = Command {
        op: CMD_ADD_PIN.to_string(),
        params: CmdParams {
            add_pin: Some(AddPin {
                db_id: content,
                user_id: 3,
                cid,
                peers: Vec::new(),
            }),
            ..Default::default()
        },
    };
    serde_json::to_string(&command).unwrap()
}

fn unpin(contents: Vec<i64>) -> String {
    let command = Command {
        op: CMD_UNPIN_CONTENT.to_string(),
        params: CmdParams {
            unpin_content: Some(UnpinContent { contents }),
            ..Default::default()
        },
    };
    serde_json::to_string(&command).unwrap()
}

fn build_dag(chunks: &[&[u8]]) -> (ContentAddress, Vec<Block>) {
    let mut builder = DagBuilder::new(SMALL_DAG).unwrap();
    let mut blocks = Vec::new();
    for chunk in chunks {
        blocks.extend(builder.push(chunk));
    }
    let (root, tail) = builder.finish().unwrap();
    blocks.extend(tail);
    (root, blocks)
}

async fn wait_for_status(peer: &mut Peer, content: i64, status: PinStatus) {
    loop {
        let message = recv_op(peer, OP_UPDATE_PIN_STATUS).await;
        let update = message.params.update_pin_status.unwrap();
        if update.db_id == content {
            assert_eq!(update.status, status);
            return;
        }
    }
}

#[tokio::test]
async fn test_add_pin_over_control_channel() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::open(dir.path(), "http://127.0.0.1:9").await;
    node.start_workers();
    let coordinator = connect(&mut node);
    let mut peer = accept(&coordinator).await;

    let block = Block::raw(seeded_bytes(5, 512));
    let cid = *block.cid();
    node.blockstore.put(block).await.unwrap();

    assert!(peer.send(add_pin(11, cid)));

    let complete = recv_op(&mut peer, OP_PIN_COMPLETE).await;
    let complete = complete.params.pin_complete.unwrap();
    assert_eq!(complete.db_id, 11);
    assert_eq!(complete.objects.len(), 1);
    assert_eq!(complete.objects[0].cid, cid);
    assert_eq!(complete.objects[0].size, 512);

    wait_for_status(&mut peer, 11, PinStatus::Pinned).await;

    let pin = node.metadata.get_pin_by_content(11).await.unwrap().unwrap();
    assert!(pin.active);
    assert_eq!(pin.user_id, 3);
    assert_eq!(pin.size, 512);
}

#[tokio::test]
async fn test_add_pin_for_missing_block_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::open(dir.path(), "http://127.0.0.1:9").await;
    node.start_workers();
    let coordinator = connect(&mut node);
    let mut peer = accept(&coordinator).await;

    let absent = Block::raw(seeded_bytes(6, 64));
    assert!(peer.send(add_pin(12, *absent.cid())));

    wait_for_status(&mut peer, 12, PinStatus::Failed).await;
    let pin = node.metadata.get_pin_by_content(12).await.unwrap().unwrap();
    assert!(pin.failed && !pin.active && !pin.pinning);
}

#[tokio::test]
async fn test_unpin_keeps_shared_objects() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::open(dir.path(), "http://127.0.0.1:9").await;
    node.start_workers();
    let coordinator = connect(&mut node);
    let mut peer = accept(&coordinator).await;

    let shared = seeded_bytes(10, 1024);
    let only_first = seeded_bytes(11, 1024);
    let only_second = seeded_bytes(12, 1024);
    let (first_root, first_blocks) = build_dag(&[&shared, &only_first]);
    let (second_root, second_blocks) = build_dag(&[&shared, &only_second]);
    let shared_cid = *Block::raw(shared.clone()).cid();
    let unique_cid = *Block::raw(only_first.clone()).cid();

    node.blockstore.put_many(first_blocks).await.unwrap();
    node.blockstore.put_many(second_blocks).await.unwrap();

    assert!(peer.send(add_pin(1, first_root)));
    wait_for_status(&mut peer, 1, PinStatus::Pinned).await;
    assert!(peer.send(add_pin(2, second_root)));
    wait_for_status(&mut peer, 2, PinStatus::Pinned).await;

    assert!(peer.send(unpin(vec![1])));

    let metadata = node.metadata.clone();
    let gone = eventually(|| {
        let metadata = metadata.clone();
        async move {
            metadata
                .get_pin_by_content(1)
                .await
                .is_ok_and(|pin| pin.is_none())
        }
    })
    .await;
    assert!(gone, "pin 1 was not removed");

    let blockstore = node.blockstore.clone();
    let reclaimed = eventually(|| {
        let blockstore = blockstore.clone();
        async move {
            !blockstore.has(&unique_cid).await.unwrap_or(true)
                && !blockstore.has(&first_root).await.unwrap_or(true)
        }
    })
    .await;
    assert!(reclaimed, "unique blocks of pin 1 were not deleted");

    assert!(node.blockstore.has(&shared_cid).await.unwrap());
    assert!(node.blockstore.has(&second_root).await.unwrap());
    assert!(
        node.metadata
            .get_object(&shared_cid.to_string())
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        node.metadata
            .get_object(&unique_cid.to_string())
            .await
            .unwrap()
            .is_none()
    );

    let second = node.metadata.get_pin_by_content(2).await.unwrap().unwrap();
    assert!(second.active);
    assert_eq!(node.metadata.objects_for_pin(second.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_restart_restores_in_flight_pins() {
    let dir = tempfile::tempdir().unwrap();
    let block = Block::raw(seeded_bytes(20, 2048));
    let cid = *block.cid();

    {
        // crash after the pin row was written but before it completed
        let node = TestNode::open(dir.path(), "http://127.0.0.1:9").await;
        node.blockstore.put(block).await.unwrap();
        node.metadata
            .create_pin(&NewPin {
                content: 30,
                cid,
                user_id: 4,
            })
            .await
            .unwrap();
    }

    let mut node = TestNode::open(dir.path(), "http://127.0.0.1:9").await;
    assert_eq!(node.shuttle.restore_on_startup().await.unwrap(), 1);
    node.start_workers();

    let metadata = node.metadata.clone();
    let pinned = eventually(|| {
        let metadata = metadata.clone();
        async move {
            matches!(
                metadata.get_pin_by_content(30).await,
                Ok(Some(pin)) if pin.active
            )
        }
    })
    .await;
    assert!(pinned, "restored pin did not complete");

    let complete = common::next_op(node.rx(), OP_PIN_COMPLETE).await;
    assert_eq!(complete.params.pin_complete.unwrap().db_id, 30);

    assert_eq!(node.shuttle.restore_on_startup().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reconnect_sends_hello_then_updates() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::open(dir.path(), "http://127.0.0.1:9").await;
    node.start_workers();
    let coordinator = connect(&mut node);

    Reporter::new(
        node.shuttle.queue().clone(),
        node.metadata.clone(),
        node.config.node.blockstore_path(),
        node.outbound.clone(),
        Duration::from_secs(1),
    )
    .spawn();

    let mut first = accept(&coordinator).await;
    let update = recv_op(&mut first, OP_SHUTTLE_UPDATE).await;
    assert!(update.params.shuttle_update.is_some());
    drop(first);

    let mut second = accept(&coordinator).await;
    let update = recv_op(&mut second, OP_SHUTTLE_UPDATE).await;
    let update = update.params.shuttle_update.unwrap();
    assert_eq!(update.num_pins, 0);
    assert_eq!(update.pin_queue_size, 0);
    assert!(update.blockstore_size >= update.blockstore_free);
}
