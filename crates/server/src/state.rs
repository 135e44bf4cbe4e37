//! Application state shared across handlers.

use crate::coordinator::CoordinatorClient;
use crate::shuttle::Shuttle;
use shuttle_core::config::AppConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Coordinator HTTP API, used for auth and content registration.
    pub coordinator: CoordinatorClient,
    /// Pin state machine and ingestion.
    pub shuttle: Arc<Shuttle>,
}

impl AppState {
    pub fn new(config: AppConfig, coordinator: CoordinatorClient, shuttle: Arc<Shuttle>) -> Self {
        Self {
            config: Arc::new(config),
            coordinator,
            shuttle,
        }
    }
}
