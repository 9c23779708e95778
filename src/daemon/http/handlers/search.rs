//! Nearest-neighbor handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use tracing::debug;

use super::{AppState, MAX_K};
use crate::daemon::http::types::*;
use crate::types::{SearchHit, VectorId};

fn check_k(k: usize) -> Result<(), ApiError> {
    if k > MAX_K {
        return Err(ApiError::bad_request(format!(
            "k of {} exceeds the maximum of {}",
            k, MAX_K
        )));
    }
    Ok(())
}

/// Neighbors of a stored vector, nearest first
pub async fn neighbors(
    State(state): State<AppState>,
    path: Result<Path<VectorId>, PathRejection>,
    query: Result<Query<NeighborParams>, QueryRejection>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let Path(id) = path?;
    let Query(params) = query?;
    check_k(params.num)?;
    debug!("HTTP neighbor request: id={}, num={}", id, params.num);

    let hits = match params.ef {
        Some(ef) => state.service.query_with_ef(id, params.num, ef)?,
        None => state.service.query(id, params.num)?,
    };
    Ok(Json(hits))
}

/// Neighbors of an arbitrary vector, nearest first
pub async fn query_vector(
    State(state): State<AppState>,
    body: Result<Json<VectorQueryRequest>, JsonRejection>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let Json(request) = body?;
    check_k(request.k)?;
    debug!(
        "HTTP vector query: {} dimensions, k={}",
        request.vector.len(),
        request.k
    );

    let hits = state
        .service
        .query_by_vector(&request.vector, request.k, request.ef)?;
    Ok(Json(hits))
}
