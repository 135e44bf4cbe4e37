//! Shuttle storage node.
//!
//! This crate provides:
//! - The HTTP ingestion API
//! - The control channel to the coordinator
//! - The durable pin queue and its state machine
//! - Transfer channel tracking
//! - Periodic node-state reporting

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod network;
pub mod pinner;
pub mod reporter;
pub mod routes;
pub mod rpc;
pub mod shuttle;
pub mod state;
pub mod tracker;

pub use coordinator::{CoordinatorClient, User};
pub use error::ApiError;
pub use routes::create_router;
pub use shuttle::Shuttle;
pub use state::AppState;
