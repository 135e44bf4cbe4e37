//! Core domain types and shared logic for the shuttle storage node.
//!
//! This crate defines the data model used across all other crates:
//! - Content addresses and the link-node DAG format
//! - Fixed-size chunking into balanced DAGs
//! - Control-channel protocol frames
//! - Pin lifecycle status
//! - Node identity and configuration

pub mod cid;
pub mod config;
pub mod dag;
pub mod error;
pub mod hash;
pub mod identity;
pub mod importer;
pub mod pin;
pub mod protocol;

pub use cid::{Codec, ContentAddress};
pub use dag::{Block, Link, LinkNode};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use identity::NodeIdentity;
pub use importer::{DagBuilder, ImportParams};
pub use pin::PinStatus;

/// Default chunk size: 256 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Maximum chunk size: 1 MiB
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Minimum chunk size: 1 KiB
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Default fan-out of link nodes.
pub const DEFAULT_MAX_LINKS: usize = 174;
