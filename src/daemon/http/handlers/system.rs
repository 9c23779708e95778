//! System handlers: health, metrics, stats

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::AppState;
use crate::daemon::http::types::*;
use crate::daemon::metrics::MetricsSnapshot;
use crate::daemon::service::IndexStats;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.service.metrics();
    metrics.update_memory_usage();
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics.to_prometheus(),
    )
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub index: IndexStats,
    pub metrics: MetricsSnapshot,
}

/// Index statistics endpoint
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        index: state.service.stats(),
        metrics: state.service.metrics().snapshot(),
    })
}
