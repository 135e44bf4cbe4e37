//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid content address: {0}")]
    InvalidAddress(String),

    #[error("unsupported codec: 0x{0:x}")]
    UnsupportedCodec(u64),

    #[error("malformed dag node {cid}: {reason}")]
    MalformedNode { cid: String, reason: String },

    #[error("invalid chunk size: {size} (must be between {min} and {max})")]
    InvalidChunkSize { size: usize, min: usize, max: usize },

    #[error("invalid import parameters: {0}")]
    InvalidParams(String),

    #[error("invalid node identity: {0}")]
    InvalidIdentity(String),

    #[error("unknown rpc operation: {0}")]
    UnknownOperation(String),

    #[error("missing parameters for rpc operation {0}")]
    MissingParams(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
