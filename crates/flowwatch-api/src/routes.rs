//! API route definitions.

use axum::{Router, middleware::from_fn, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{flows, health, servers};
use crate::middleware::{cors_layer, request_id};
use crate::state::AppState;

/// Create the main API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .layer(from_fn(request_id))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/servers", get(servers::list_servers))
        .route("/flows", get(flows::list_flows))
        .route("/flows/{name}", get(flows::get_flow))
}
