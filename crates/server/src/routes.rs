//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config.server.max_upload_bytes).unwrap_or(usize::MAX);

    // Auth runs before the handler reads any of the body.
    let content_routes = Router::new()
        .route("/content/add", post(handlers::add_content))
        .layer(DefaultBodyLimit::max(upload_limit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let mut router = Router::new()
        // Health check (unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        .merge(content_routes);

    // Must be network-restricted to the Prometheus scraper when enabled.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router = router.layer(CorsLayer::permissive());
    if state.config.server.request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router.with_state(state)
}
