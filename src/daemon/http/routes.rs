//! HTTP API Route Definitions
//!
//! Defines the REST API routes for annserve.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};

use crate::daemon::metrics::Timer;

use super::auth::{auth_middleware, AuthState};
use super::handlers::{self, AppState};

/// Create the API router with all routes
pub fn create_router(app_state: AppState, auth_state: AuthState, max_upload_bytes: usize) -> Router {
    let protected = Router::new()
        .route("/index_vectors", post(handlers::index_vectors))
        .route("/vector/:id", get(handlers::neighbors))
        .route("/query", post(handlers::query_vector))
        .route("/stats", get(handlers::stats))
        .route("/index/save", post(handlers::save_index))
        .route("/index/reload", post(handlers::reload_index))
        .route("/metrics", get(handlers::prometheus_metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    // Liveness routes stay reachable without a key
    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            track_requests,
        ))
        .with_state(app_state)
}

/// Count and time every request
async fn track_requests(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let timer = Timer::start();
    let response = next.run(request).await;

    let metrics = state.service.metrics();
    metrics.http_requests_total.inc();
    timer.record(&metrics.http_request_latency);
    response
}
