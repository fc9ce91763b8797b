//! Server handlers.

use axum::{Json, extract::State};
use flowwatch_engine::{MetricsSnapshot, ServerInfo};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ServerResponse {
    #[serde(flatten)]
    pub info: ServerInfo,
    pub flows: Vec<String>,
    /// Flows left without a job tree, with the reason.
    pub unresolved: Vec<UnresolvedFlow>,
    pub events: MetricsSnapshot,
}

#[derive(Serialize)]
pub struct UnresolvedFlow {
    pub name: String,
    pub reason: String,
}

pub async fn list_servers(State(state): State<Arc<AppState>>) -> Json<Vec<ServerResponse>> {
    let servers = state
        .watchers
        .iter()
        .map(|watcher| ServerResponse {
            info: watcher.info().clone(),
            flows: watcher.store().flow_names(),
            unresolved: watcher
                .store()
                .unresolved()
                .iter()
                .map(|(name, reason)| UnresolvedFlow {
                    name: name.clone(),
                    reason: reason.clone(),
                })
                .collect(),
            events: watcher.metrics().snapshot(),
        })
        .collect();
    Json(servers)
}
