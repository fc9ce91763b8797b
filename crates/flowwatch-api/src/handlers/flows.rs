//! Flow handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use flowwatch_core::RunState;
use flowwatch_engine::RenderedFlow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct FlowParams {
    /// Restrict the lookup to one server.
    #[serde(default)]
    pub server: Option<String>,
}

#[derive(Serialize)]
pub struct FlowSummary {
    pub server: String,
    pub name: String,
    pub state: Option<RunState>,
}

#[derive(Serialize)]
pub struct FlowResponse {
    pub server: String,
    #[serde(flatten)]
    pub flow: RenderedFlow,
}

pub async fn list_flows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FlowParams>,
) -> Result<Json<Vec<FlowSummary>>, (StatusCode, String)> {
    let watchers = match &params.server {
        Some(server) => vec![
            state
                .watcher(server)
                .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Server {} not found", server)))?,
        ],
        None => state.watchers.iter().collect(),
    };

    let mut flows = Vec::new();
    for watcher in watchers {
        let store = watcher.store();
        for name in store.flow_names() {
            let state = store.snapshot(&name).await.and_then(|flow| flow.state);
            flows.push(FlowSummary {
                server: watcher.info().name.clone(),
                name,
                state,
            });
        }
    }
    Ok(Json(flows))
}

/// Render a flow. Without `?server=` the first server defining it wins.
pub async fn get_flow(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<FlowParams>,
) -> Result<Json<FlowResponse>, (StatusCode, String)> {
    for watcher in &state.watchers {
        let server = &watcher.info().name;
        if params.server.as_ref().is_some_and(|wanted| wanted != server) {
            continue;
        }
        if let Some(flow) = watcher.store().render(&name).await {
            return Ok(Json(FlowResponse {
                server: server.clone(),
                flow,
            }));
        }
    }
    Err((StatusCode::NOT_FOUND, format!("Flow {} not found", name)))
}
