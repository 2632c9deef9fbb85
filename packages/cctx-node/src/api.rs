//! Health & Status API endpoints
//!
//! Provides HTTP endpoints for monitoring and status:
//! - GET /health - Liveness
//! - GET /ready - Every chain has a resume point and a healthy RPC
//! - GET /metrics - Prometheus metrics
//! - GET /status - Per-chain heights and RPC health, uptime

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::info;

use crate::metrics;
use crate::observer::{ChainState, ChainStatus};

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct ApiState {
    chains: Arc<Vec<Arc<ChainState>>>,
    started_at: Instant,
}

impl ApiState {
    pub fn new(chains: Vec<Arc<ChainState>>) -> Self {
        Self {
            chains: Arc::new(chains),
            started_at: Instant::now(),
        }
    }

    fn snapshots(&self) -> Vec<ChainStatus> {
        self.chains.iter().map(|c| c.snapshot()).collect()
    }
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub chains: Vec<ChainStatus>,
}

async fn health() -> &'static str {
    "OK"
}

/// Ready once every chain has loaded a resume point and its RPC is fresh
async fn ready(State(state): State<ApiState>) -> (StatusCode, &'static str) {
    let ready = state
        .snapshots()
        .iter()
        .all(|c| c.last_block_scanned > 0 && c.rpc.healthy);
    if ready {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let chains = state.snapshots();
    let status = if chains.iter().all(|c| c.rpc.healthy) {
        "healthy"
    } else {
        "degraded"
    };
    Json(StatusResponse {
        status: status.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        chains,
    })
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/status", get(status))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Start the API server
pub async fn start_api_server(addr: SocketAddr, state: ApiState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server started");

    metrics::UP.set(1.0);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RpcStatus;
    use crate::types::ChainParams;

    fn chain(id: u64, scanned: u64, healthy: bool) -> Arc<ChainState> {
        let state = ChainState::new(id, "test", ChainParams::default_for(id));
        state.set_last_block_scanned(scanned);
        state.set_rpc_status(RpcStatus {
            healthy,
            ..Default::default()
        });
        Arc::new(state)
    }

    #[tokio::test]
    async fn test_status_lists_chains() {
        let state = ApiState::new(vec![chain(1, 10, true), chain(56, 20, false)]);
        let Json(resp) = status(State(state)).await;
        assert_eq!(resp.status, "degraded");
        assert_eq!(resp.chains.len(), 2);
        assert_eq!(resp.chains[1].chain_id, 56);
        assert_eq!(resp.chains[1].last_block_scanned, 20);
        assert!(!resp.chains[1].rpc.healthy);
    }

    #[tokio::test]
    async fn test_ready_requires_resume_point() {
        let state = ApiState::new(vec![chain(1, 0, true)]);
        assert_eq!(ready(State(state)).await.0, StatusCode::SERVICE_UNAVAILABLE);

        let state = ApiState::new(vec![chain(1, 5, true)]);
        assert_eq!(ready(State(state)).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_encoded() {
        metrics::record_dispatch(1);
        let resp = prometheus_metrics().await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
