//! Read-only HTTP status API for Flowwatch.
//!
//! Serves snapshots of every watched server's flows: resolved job trees,
//! render adjacency and live build status.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Status API listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
