//! Ops Server - read-only HTTP surface over [`OpsState`]
//!
//! - `GET /health`: liveness, always `200 {"status":"ok"}`
//! - `GET /ready`: `200` or `503` with the readiness snapshot
//! - `GET /metrics`: Prometheus text exposition

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use funding_runtime::{OpsState, Shutdown};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// HTTP ops server
pub struct OpsServer {
    ops: Arc<OpsState>,
}

impl OpsServer {
    pub fn new(ops: Arc<OpsState>) -> Self {
        Self { ops }
    }

    /// Create the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/ready", get(handle_ready))
            .route("/metrics", get(handle_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(self.ops.clone())
    }

    /// Bind `addr` and serve until `stop` fires
    pub async fn run(self, addr: SocketAddr, stop: Shutdown) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, stop).await
    }

    /// Serve on `listener` until `stop` fires, then drain in-flight requests.
    ///
    /// `stop` should fire only once the funder has finished its work, so
    /// `/ready` can report `shutting_down` while a confirmation completes.
    pub async fn serve(self, listener: TcpListener, stop: Shutdown) -> anyhow::Result<()> {
        tracing::info!("Ops server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { stop.wait().await })
            .await?;

        tracing::info!("Ops server stopped");
        Ok(())
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_ready(State(ops): State<Arc<OpsState>>) -> Response {
    let snapshot = ops.readiness();
    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot)).into_response()
}

async fn handle_metrics(State(ops): State<Arc<OpsState>>) -> Response {
    match ops.render_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
