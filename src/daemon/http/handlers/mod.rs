//! HTTP API Request Handlers
//!
//! Handlers that map HTTP requests to QueryService operations.

mod index;
mod search;
mod system;

use std::path::PathBuf;
use std::sync::Arc;

use crate::daemon::service::QueryService;

/// Largest neighbor count a single request may ask for
const MAX_K: usize = 10_000;

/// Multipart part carrying the vector table
pub const VECTORS_PART: &str = "docvectors";

/// Multipart part carrying the id list
pub const IDS_PART: &str = "doc2vec_id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
    /// Target of save/reload and of persist-on-rebuild
    pub index_path: Arc<PathBuf>,
    pub persist_on_rebuild: bool,
}

impl AppState {
    pub fn new(service: Arc<QueryService>, index_path: PathBuf, persist_on_rebuild: bool) -> Self {
        Self {
            service,
            index_path: Arc::new(index_path),
            persist_on_rebuild,
        }
    }
}

// Re-export all handlers
pub use index::{index_vectors, reload_index, save_index};
pub use search::{neighbors, query_vector};
pub use system::{health, prometheus_metrics, stats};
