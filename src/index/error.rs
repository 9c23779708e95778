//! Error taxonomy for the vector index

use thiserror::Error;

use crate::types::VectorId;

/// Errors raised by the store, the graph, the codec and the query service
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Duplicate vector id: {0}")]
    DuplicateId(VectorId),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Index contains no nodes")]
    EmptyIndex,
    #[error("No vectors supplied")]
    EmptyInput,
    #[error("Corrupt index file: {0}")]
    CorruptFormat(String),
    #[error("Truncated index file: needed {needed} bytes, {available} available")]
    TruncatedFile { needed: u64, available: u64 },
    #[error("No index has been built or loaded")]
    NoIndexLoaded,
    #[error("Invalid index parameters: {0}")]
    InvalidParams(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn unknown_id(id: VectorId) -> Self {
        Self::NotFound(format!("vector id {}", id))
    }

    pub fn unknown_node(node: usize) -> Self {
        Self::NotFound(format!("node index {}", node))
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::DuplicateId(_) => "DUPLICATE_ID",
            Self::NotFound(_) => "NOT_FOUND",
            Self::EmptyIndex => "EMPTY_INDEX",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::CorruptFormat(_) => "CORRUPT_FORMAT",
            Self::TruncatedFile { .. } => "TRUNCATED_FILE",
            Self::NoIndexLoaded => "NO_INDEX_LOADED",
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;
