//! Blocks and the link-node format used to build object graphs.

use crate::cid::{Codec, ContentAddress};
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An addressed chunk of bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    cid: ContentAddress,
    data: Bytes,
}

impl Block {
    /// Address `data` under `codec`.
    pub fn new(codec: Codec, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let cid = ContentAddress::compute(codec, &data);
        Self { cid, data }
    }

    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self::new(Codec::Raw, data)
    }

    /// Pair bytes with an address the caller already knows.
    ///
    /// The digest is re-checked so a corrupted block read back from storage
    /// is never handed out under the wrong name.
    pub fn with_cid(cid: ContentAddress, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let actual = ContentAddress::compute(cid.codec(), &data);
        if actual != cid {
            return Err(Error::MalformedNode {
                cid: cid.to_string(),
                reason: format!("digest mismatch, bytes hash to {actual}"),
            });
        }
        Ok(Self { cid, data })
    }

    pub fn cid(&self) -> &ContentAddress {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Child addresses of this block. Raw leaves have none.
    pub fn links(&self) -> Result<Vec<ContentAddress>> {
        match self.cid.codec() {
            Codec::Raw => Ok(Vec::new()),
            Codec::DagJson => {
                let node = LinkNode::decode(&self.cid, &self.data)?;
                Ok(node.links.into_iter().map(|l| l.cid).collect())
            }
        }
    }
}

/// A reference from a link node to a child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub cid: ContentAddress,
    /// Encoded bytes of the whole subtree under `cid`, the child included.
    pub size: u64,
}

/// Interior node of a file DAG.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkNode {
    pub links: Vec<Link>,
    /// File bytes reachable through this node.
    pub data_size: u64,
}

impl LinkNode {
    /// Canonical encoding. Field order is fixed by the struct layout.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(cid: &ContentAddress, data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::MalformedNode {
            cid: cid.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_block(&self) -> Result<Block> {
        Ok(Block::new(Codec::DagJson, self.encode()?))
    }
}
