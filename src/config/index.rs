//! Index construction and persistence configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::index::{HnswParams, Metric};

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index file used for restore-on-start, save and reload
    pub path: PathBuf,
    /// Distance metric
    pub metric: Metric,
    /// HNSW M parameter (connections per layer)
    pub m: usize,
    /// HNSW ef_construction parameter
    pub ef_construction: usize,
    /// HNSW ef_search parameter
    pub ef_search: usize,
    /// Seed for reproducible builds
    pub seed: Option<u64>,
    /// Save the index after every upload-triggered rebuild
    pub persist_on_rebuild: bool,
    /// Load the index file at start-up when it exists
    pub load_on_start: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("index_optim.bin"),
            metric: Metric::L2,
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            seed: None,
            persist_on_rebuild: true,
            load_on_start: true,
        }
    }
}

impl IndexConfig {
    /// Graph construction parameters
    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            metric: self.metric,
            m: self.m,
            ef_construction: self.ef_construction,
            seed: self.seed,
        }
    }
}
