//! HTTP/WebSocket boundary adapter (SPEC_FULL.md §6, "Supplemental:
//! Boundary adapters"). Thin by design: `/health`, `/ws`, `/ws/funding`
//! only — no templated HTML pages, per the Non-goal in §1.

pub mod health;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use health::HealthState;
use ws::AppState;

pub fn router(health_state: Arc<HealthState>, app_state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .with_state(health_state);
    let ws_routes = Router::new()
        .route("/ws", get(ws::market_rows))
        .route("/ws/funding", get(ws::funding))
        .with_state(app_state);
    health_routes.merge(ws_routes)
}

/// Grounded on `adapters/metrics/health.rs`'s `HealthServer::serve`:
/// bind, serve, and honor a shutdown signal for a clean exit.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "boundary listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
