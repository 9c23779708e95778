//! HTTP API Request/Response Types
//!
//! JSON-serializable types for the HTTP API, plus the mapping from service
//! errors to status codes.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::import::ParseError;
use crate::index::IndexError;

/// Query string of `GET /vector/:id`
#[derive(Debug, Clone, Deserialize)]
pub struct NeighborParams {
    /// Number of neighbors (default: 10)
    #[serde(default = "default_num")]
    pub num: usize,
    /// Search beam width; the service default when absent
    #[serde(default)]
    pub ef: Option<usize>,
}

fn default_num() -> usize {
    10
}

/// Body of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorQueryRequest {
    pub vector: Vec<f32>,
    #[serde(default = "default_num")]
    pub k: usize,
    #[serde(default)]
    pub ef: Option<usize>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

/// Response to a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexVectorsResponse {
    /// Always "OK"
    pub status: String,
    pub vectors_indexed: usize,
    pub dimensions: usize,
    pub duration_ms: u64,
    /// Where the new index was saved, when persisting is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
}

/// Response to save/reload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistResponse {
    pub status: String,
    pub path: String,
    pub vectors: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Invalid or missing API key")
    }
}

/// Handler error carrying its status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, body: ErrorResponse) -> Self {
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorResponse::bad_request(message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::internal_error(message),
        )
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match &err {
            IndexError::DimensionMismatch { .. }
            | IndexError::DuplicateId(_)
            | IndexError::EmptyInput => StatusCode::BAD_REQUEST,
            IndexError::NotFound(_) => StatusCode::NOT_FOUND,
            IndexError::NoIndexLoaded | IndexError::EmptyIndex => StatusCode::SERVICE_UNAVAILABLE,
            IndexError::CorruptFormat(_) | IndexError::TruncatedFile { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IndexError::InvalidParams(_) | IndexError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, ErrorResponse::new(err.code(), err.to_string()))
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        let code = match &err {
            ParseError::InvalidNumber { .. } => "INVALID_NUMBER",
            ParseError::RowCountMismatch { .. } => "ROW_COUNT_MISMATCH",
            ParseError::InvalidEncoding(_) => "INVALID_ENCODING",
            ParseError::Io(_) => "IO_ERROR",
        };
        Self::new(StatusCode::BAD_REQUEST, ErrorResponse::new(code, err.to_string()))
    }
}

/// Extractor rejections keep axum's status but use the JSON error body
macro_rules! impl_from_rejection {
    ($($rejection:ty => $code:literal),* $(,)?) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    Self::new(
                        rejection.status(),
                        ErrorResponse::new($code, rejection.body_text()),
                    )
                }
            }
        )*
    };
}

impl_from_rejection! {
    PathRejection => "INVALID_PATH",
    QueryRejection => "INVALID_QUERY",
    JsonRejection => "INVALID_JSON",
    MultipartRejection => "INVALID_MULTIPART",
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: IndexError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_index_error_status_mapping() {
        assert_eq!(
            status_of(IndexError::DimensionMismatch { expected: 2, actual: 3 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(IndexError::DuplicateId(4)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(IndexError::EmptyInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(IndexError::unknown_id(9)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(IndexError::NoIndexLoaded), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(IndexError::EmptyIndex), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(IndexError::CorruptFormat("bad magic".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(IndexError::TruncatedFile { needed: 10, available: 2 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(IndexError::Io(std::io::Error::other("disk"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_carries_code() {
        let err = ApiError::from(IndexError::NoIndexLoaded);
        assert_eq!(err.body.code, "NO_INDEX_LOADED");

        let err = ApiError::from(ParseError::RowCountMismatch { vectors: 3, ids: 2 });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "ROW_COUNT_MISMATCH");
        assert!(err.body.message.contains("3 vectors"));
    }

    #[test]
    fn test_neighbor_params_default() {
        let params: NeighborParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.num, 10);
        assert_eq!(params.ef, None);
    }
}
