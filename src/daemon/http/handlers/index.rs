//! Index handlers: upload-and-rebuild, save, reload

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use tracing::{debug, error, info};

use super::{AppState, IDS_PART, VECTORS_PART};
use crate::daemon::http::types::*;
use crate::import::parse_upload;

/// Run blocking index work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Index task panicked or was cancelled: {}", e);
        ApiError::internal(format!("index task failed: {}", e))
    })?
}

/// Upload endpoint: rebuild the served index from a vector table and an id list
pub async fn index_vectors(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IndexVectorsResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut vectors = None;
    let mut ids = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_owned);
        let target = match name.as_deref() {
            Some(VECTORS_PART) => &mut vectors,
            Some(IDS_PART) => &mut ids,
            other => {
                debug!("Ignoring multipart field {:?}", other);
                continue;
            }
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
        *target = Some(bytes);
    }

    let vectors = vectors
        .ok_or_else(|| ApiError::bad_request(format!("missing multipart part '{}'", VECTORS_PART)))?;
    let ids =
        ids.ok_or_else(|| ApiError::bad_request(format!("missing multipart part '{}'", IDS_PART)))?;

    debug!(
        "HTTP index request: {} vector bytes, {} id bytes",
        vectors.len(),
        ids.len()
    );

    let service = state.service.clone();
    let index_path = state.index_path.clone();
    let persist = state.persist_on_rebuild;

    blocking(move || {
        let rows = parse_upload(&vectors, &ids)?;
        let summary = service.rebuild(rows)?;

        let saved_to = if persist {
            service.persist(index_path.as_path())?;
            info!("Persisted rebuilt index to {}", index_path.display());
            Some(index_path.display().to_string())
        } else {
            None
        };

        Ok(Json(IndexVectorsResponse {
            status: "OK".to_string(),
            vectors_indexed: summary.vectors_indexed,
            dimensions: summary.dimensions,
            duration_ms: summary.duration_ms,
            saved_to,
        }))
    })
    .await
}

/// Save the served index to the configured path
pub async fn save_index(State(state): State<AppState>) -> Result<Json<PersistResponse>, ApiError> {
    let service = state.service.clone();
    let index_path = state.index_path.clone();

    blocking(move || {
        service.persist(index_path.as_path())?;
        Ok(Json(PersistResponse {
            status: "OK".to_string(),
            path: index_path.display().to_string(),
            vectors: service.stats().vectors,
        }))
    })
    .await
}

/// Replace the served index with the one saved at the configured path
pub async fn reload_index(State(state): State<AppState>) -> Result<Json<PersistResponse>, ApiError> {
    let service = state.service.clone();
    let index_path = state.index_path.clone();

    blocking(move || {
        let stats = service.restore(index_path.as_path())?;
        Ok(Json(PersistResponse {
            status: "OK".to_string(),
            path: index_path.display().to_string(),
            vectors: stats.vectors,
        }))
    })
    .await
}
