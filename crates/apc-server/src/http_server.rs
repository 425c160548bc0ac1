//! HTTP server for the Prometheus endpoint and read-only status views.

use crate::metrics::MetricsRegistry;
use apc::{ApcStatus, SnapshotHandle};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    registry: Arc<MetricsRegistry>,
    status: watch::Receiver<Option<ApcStatus>>,
    snapshots: SnapshotHandle,
}

/// Serves `/metrics`, `/status` and `/neighbors`
pub struct MetricsServer {
    state: AppState,
    /// Listen address
    listen_addr: String,
}

impl MetricsServer {
    pub fn new(
        registry: Arc<MetricsRegistry>,
        status: watch::Receiver<Option<ApcStatus>>,
        snapshots: SnapshotHandle,
        listen_addr: String,
    ) -> Self {
        Self {
            state: AppState {
                registry,
                status,
                snapshots,
            },
            listen_addr,
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .route("/neighbors", get(neighbors_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state.clone())
    }

    /// Run the HTTP server
    pub async fn run(self) -> common::Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Metrics server listening");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    // Gauges and counters are brought up to date on each scrape
    if let Some(snapshot) = state.snapshots.get().await {
        state.registry.update_from_snapshot(&snapshot);
    }

    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.registry.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

/// Confirmed status; 503 until the first election result is confirmed
async fn status_handler(State(state): State<AppState>) -> Response {
    let status = *state.status.borrow();
    match status {
        Some(status) => Json(status).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "election not confirmed yet").into_response(),
    }
}

/// Neighbor table; 503 once the node has stopped
async fn neighbors_handler(State(state): State<AppState>) -> Response {
    match state.snapshots.get().await {
        Some(snapshot) => Json(snapshot.neighbors).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "node not running").into_response(),
    }
}
