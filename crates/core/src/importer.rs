//! Fixed-size chunking and balanced DAG layout.
//!
//! [`DagBuilder`] is fed bytes incrementally and hands back every block as soon
//! as it can be produced, so callers can persist leaves while the upload is
//! still streaming. The layout only depends on the input bytes, the chunk
//! size and the link fan-out, which keeps root addresses reproducible.

use crate::cid::ContentAddress;
use crate::dag::{Block, Link, LinkNode};
use crate::{Error, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, Result};
use bytes::BytesMut;

/// Chunking and fan-out policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportParams {
    pub chunk_size: usize,
    pub max_links: usize,
}

impl Default for ImportParams {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            max_links: crate::DEFAULT_MAX_LINKS,
        }
    }
}

impl ImportParams {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(Error::InvalidChunkSize {
                size: self.chunk_size,
                min: MIN_CHUNK_SIZE,
                max: MAX_CHUNK_SIZE,
            });
        }
        if self.max_links < 2 {
            return Err(Error::InvalidParams(format!(
                "max_links must be at least 2, got {}",
                self.max_links
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    cid: ContentAddress,
    /// Encoded bytes of the subtree.
    tree_size: u64,
    /// File bytes under the subtree.
    data_size: u64,
}

/// Incremental importer for a single byte stream.
#[derive(Debug)]
pub struct DagBuilder {
    params: ImportParams,
    pending: BytesMut,
    leaves: Vec<Entry>,
    total_bytes: u64,
}

impl DagBuilder {
    pub fn new(params: ImportParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            pending: BytesMut::with_capacity(params.chunk_size),
            leaves: Vec::new(),
            total_bytes: 0,
        })
    }

    /// Bytes accepted so far.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Feed more input. Returns the leaves completed by this call.
    pub fn push(&mut self, mut data: &[u8]) -> Vec<Block> {
        let mut produced = Vec::new();
        self.total_bytes += data.len() as u64;

        while !data.is_empty() {
            let room = self.params.chunk_size - self.pending.len();
            let take = room.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.params.chunk_size {
                produced.push(self.cut_leaf());
            }
        }

        produced
    }

    fn cut_leaf(&mut self) -> Block {
        let chunk = self.pending.split().freeze();
        let block = Block::raw(chunk);
        self.leaves.push(Entry {
            cid: *block.cid(),
            tree_size: block.size(),
            data_size: block.size(),
        });
        block
    }

    /// Flush the trailing chunk and build the link levels.
    ///
    /// Returns the root address together with every block not yet handed out.
    pub fn finish(mut self) -> Result<(ContentAddress, Vec<Block>)> {
        let mut produced = Vec::new();
        if !self.pending.is_empty() || self.leaves.is_empty() {
            produced.push(self.cut_leaf());
        }

        let mut level = std::mem::take(&mut self.leaves);
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(self.params.max_links));
            for group in level.chunks(self.params.max_links) {
                let node = LinkNode {
                    links: group
                        .iter()
                        .map(|e| Link {
                            cid: e.cid,
                            size: e.tree_size,
                        })
                        .collect(),
                    data_size: group.iter().map(|e| e.data_size).sum(),
                };
                let block = node.to_block()?;
                next.push(Entry {
                    cid: *block.cid(),
                    tree_size: block.size() + group.iter().map(|e| e.tree_size).sum::<u64>(),
                    data_size: node.data_size,
                });
                produced.push(block);
            }
            level = next;
        }

        let root = level
            .first()
            .map(|e| e.cid)
            .ok_or_else(|| Error::InvalidParams("importer produced no root".to_string()))?;
        Ok((root, produced))
    }
}
