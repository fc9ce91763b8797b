//! Liveness and readiness.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub servers: Vec<ServerHealth>,
}

#[derive(Serialize)]
pub struct ServerHealth {
    pub name: String,
    pub listening: bool,
}

/// Always answers; `degraded` while some server has no live subscription.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let servers: Vec<ServerHealth> = state
        .watchers
        .iter()
        .map(|w| ServerHealth {
            name: w.info().name.clone(),
            listening: w.is_listening(),
        })
        .collect();
    let status = if servers.iter().all(|s| s.listening) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        servers,
    })
}

/// 503 until every watched server is subscribed to its transport.
pub async fn ready(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.watchers.iter().all(|w| w.is_listening()) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
