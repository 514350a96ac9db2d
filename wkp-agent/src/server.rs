//! Axum health server.

use crate::state::AppState;
use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use wkp_agent_core::processors::{PollerStatsSnapshot, wait_for_shutdown};

/// Build the health router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    pollers: BTreeMap<String, PollerStatsSnapshot>,
}

/// Returns OK while the agent is running, with poller counters.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let pollers = state
        .pollers()
        .iter()
        .map(|(name, stats)| (name.clone(), stats.snapshot()))
        .collect();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        pollers,
    })
}

/// Run the server until shutdown is signalled.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Health server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown_rx).await })
        .await
}
