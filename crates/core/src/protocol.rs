//! Control-channel messages exchanged with the coordinator.
//!
//! Frames are JSON objects using the coordinator's PascalCase field names.
//! The shuttle sends one [`Hello`] per connection followed by any number of
//! [`Message`]s, and receives [`Command`]s.

use crate::cid::ContentAddress;
use crate::pin::PinStatus;
use serde::{Deserialize, Serialize};

pub const OP_SHUTTLE_UPDATE: &str = "ShuttleUpdate";
pub const OP_TRANSFER_STATUS: &str = "TransferStatus";
pub const OP_UPDATE_PIN_STATUS: &str = "UpdatePinStatus";
pub const OP_PIN_COMPLETE: &str = "PinComplete";

pub const CMD_ADD_PIN: &str = "AddPin";
pub const CMD_TAKE_CONTENT: &str = "TakeContent";
pub const CMD_UNPIN_CONTENT: &str = "UnpinContent";
pub const CMD_START_TRANSFER: &str = "StartTransfer";

/// Peer identity plus the multiaddrs it can be reached on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddrInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub addrs: Vec<String>,
}

/// First frame on every connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Hello {
    pub host: String,
    #[serde(rename = "PeerID")]
    pub peer_id: String,
    /// Default settlement address of this node.
    pub address: String,
    pub addr_info: AddrInfo,
}

/// Outbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    pub op: String,
    pub params: MsgParams,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MsgParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuttle_update: Option<ShuttleUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_status: Option<TransferStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_pin_status: Option<UpdatePinStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_complete: Option<PinComplete>,
}

impl Message {
    pub fn shuttle_update(update: ShuttleUpdate) -> Self {
        Self {
            op: OP_SHUTTLE_UPDATE.to_string(),
            params: MsgParams {
                shuttle_update: Some(update),
                ..Default::default()
            },
        }
    }

    pub fn transfer_status(status: TransferStatus) -> Self {
        Self {
            op: OP_TRANSFER_STATUS.to_string(),
            params: MsgParams {
                transfer_status: Some(status),
                ..Default::default()
            },
        }
    }

    pub fn update_pin_status(content_id: i64, status: PinStatus) -> Self {
        Self {
            op: OP_UPDATE_PIN_STATUS.to_string(),
            params: MsgParams {
                update_pin_status: Some(UpdatePinStatus {
                    db_id: content_id,
                    status,
                }),
                ..Default::default()
            },
        }
    }

    pub fn pin_complete(complete: PinComplete) -> Self {
        Self {
            op: OP_PIN_COMPLETE.to_string(),
            params: MsgParams {
                pin_complete: Some(complete),
                ..Default::default()
            },
        }
    }
}

/// Periodic snapshot of node state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShuttleUpdate {
    pub pin_queue_size: u64,
    pub blockstore_size: u64,
    pub blockstore_free: u64,
    pub num_pins: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferStatus {
    pub chanid: String,
    #[serde(rename = "DealDBID")]
    pub deal_db_id: i64,
    pub state: ChannelState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdatePinStatus {
    #[serde(rename = "DBID")]
    pub db_id: i64,
    pub status: PinStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PinComplete {
    #[serde(rename = "DBID")]
    pub db_id: i64,
    pub size: u64,
    pub objects: Vec<PinObject>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PinObject {
    pub cid: ContentAddress,
    pub size: u64,
}

/// Lifecycle of a data-transfer channel as observed by this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStatus {
    Requested,
    Ongoing,
    TransferFinished,
    ResponderCompleted,
    Completed,
    Failed,
    Cancelled,
}

impl ChannelStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelStatus::Completed | ChannelStatus::Failed | ChannelStatus::Cancelled
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelState {
    pub status: ChannelStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub received: u64,
}

impl ChannelState {
    pub fn new(status: ChannelStatus) -> Self {
        Self {
            status,
            message: String::new(),
            sent: 0,
            received: 0,
        }
    }
}

/// Inbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Command {
    pub op: String,
    #[serde(default)]
    pub params: CmdParams,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CmdParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_pin: Option<AddPin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_content: Option<TakeContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpin_content: Option<UnpinContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_transfer: Option<StartTransfer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddPin {
    #[serde(rename = "DBID")]
    pub db_id: i64,
    pub user_id: i64,
    pub cid: ContentAddress,
    #[serde(default)]
    pub peers: Vec<AddrInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TakeContent {
    pub contents: Vec<AddPin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnpinContent {
    pub contents: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartTransfer {
    #[serde(rename = "DealDBID")]
    pub deal_db_id: i64,
    #[serde(rename = "ContentID")]
    pub content_id: i64,
    pub miner: String,
    pub prop_cid: String,
    pub data_cid: ContentAddress,
}

/// A command resolved to its typed parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    AddPin(AddPin),
    TakeContent(TakeContent),
    UnpinContent(UnpinContent),
    StartTransfer(StartTransfer),
}

impl Command {
    /// Resolve the op name against its parameter slot.
    pub fn into_request(self) -> crate::Result<Request> {
        let Command { op, params } = self;
        let missing = || crate::Error::MissingParams(op.clone());
        match op.as_str() {
            CMD_ADD_PIN => params.add_pin.map(Request::AddPin).ok_or_else(missing),
            CMD_TAKE_CONTENT => params
                .take_content
                .map(Request::TakeContent)
                .ok_or_else(missing),
            CMD_UNPIN_CONTENT => params
                .unpin_content
                .map(Request::UnpinContent)
                .ok_or_else(missing),
            CMD_START_TRANSFER => params
                .start_transfer
                .map(Request::StartTransfer)
                .ok_or_else(missing),
            _ => Err(crate::Error::UnknownOperation(op.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::Codec;

    #[test]
    fn test_hello_wire_names() {
        let hello = Hello {
            host: "https://shuttle-1.example.com".to_string(),
            peer_id: "12D3Koo".to_string(),
            address: "f1abc".to_string(),
            addr_info: AddrInfo {
                id: "12D3Koo".to_string(),
                addrs: vec!["/ip4/0.0.0.0/tcp/6745".to_string()],
            },
        };
        let json = serde_json::to_value(&hello).unwrap();
        assert_eq!(json["Host"], "https://shuttle-1.example.com");
        assert_eq!(json["PeerID"], "12D3Koo");
        assert_eq!(json["Address"], "f1abc");
        assert_eq!(json["AddrInfo"]["ID"], "12D3Koo");
        assert_eq!(json["AddrInfo"]["Addrs"][0], "/ip4/0.0.0.0/tcp/6745");
    }

    #[test]
    fn test_message_only_carries_its_param() {
        let msg = Message::update_pin_status(42, PinStatus::Failed);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["Op"], "UpdatePinStatus");
        assert_eq!(json["Params"]["UpdatePinStatus"]["DBID"], 42);
        assert_eq!(json["Params"]["UpdatePinStatus"]["Status"], "failed");
        assert_eq!(json["Params"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_shuttle_update_fields() {
        let msg = Message::shuttle_update(ShuttleUpdate {
            pin_queue_size: 3,
            blockstore_size: 100,
            blockstore_free: 40,
            num_pins: 7,
        });
        let json = serde_json::to_value(&msg).unwrap();
        let upd = &json["Params"]["ShuttleUpdate"];
        assert_eq!(upd["PinQueueSize"], 3);
        assert_eq!(upd["BlockstoreSize"], 100);
        assert_eq!(upd["BlockstoreFree"], 40);
        assert_eq!(upd["NumPins"], 7);
    }

    #[test]
    fn test_transfer_status_fields() {
        let msg = Message::transfer_status(TransferStatus {
            chanid: "chan-1".to_string(),
            deal_db_id: 9,
            state: ChannelState::new(ChannelStatus::Ongoing),
        });
        let json = serde_json::to_value(&msg).unwrap();
        let st = &json["Params"]["TransferStatus"];
        assert_eq!(st["Chanid"], "chan-1");
        assert_eq!(st["DealDBID"], 9);
        assert_eq!(st["State"]["Status"], "Ongoing");
    }

    #[test]
    fn test_decode_add_pin_command() {
        let cid = ContentAddress::compute(Codec::Raw, b"data");
        let raw = format!(
            r#"{{"Op":"AddPin","Params":{{"AddPin":{{"DBID":5,"UserId":2,"Cid":"{cid}","Peers":[{{"ID":"peer","Addrs":[]}}]}}}}}}"#
        );
        let cmd: Command = serde_json::from_str(&raw).unwrap();
        match cmd.into_request().unwrap() {
            Request::AddPin(add) => {
                assert_eq!(add.db_id, 5);
                assert_eq!(add.user_id, 2);
                assert_eq!(add.cid, cid);
                assert_eq!(add.peers.len(), 1);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unpin_and_unknown() {
        let cmd: Command =
            serde_json::from_str(r#"{"Op":"UnpinContent","Params":{"UnpinContent":{"Contents":[1,2]}}}"#)
                .unwrap();
        assert_eq!(
            cmd.into_request().unwrap(),
            Request::UnpinContent(UnpinContent {
                contents: vec![1, 2]
            })
        );

        let cmd: Command = serde_json::from_str(r#"{"Op":"Reboot"}"#).unwrap();
        assert!(matches!(
            cmd.into_request(),
            Err(crate::Error::UnknownOperation(op)) if op == "Reboot"
        ));

        let cmd: Command = serde_json::from_str(r#"{"Op":"AddPin","Params":{}}"#).unwrap();
        assert!(matches!(
            cmd.into_request(),
            Err(crate::Error::MissingParams(_))
        ));
    }
}
