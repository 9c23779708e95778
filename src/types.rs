//! Core types shared by the index, the service and the HTTP API

use serde::{Deserialize, Serialize};

/// External identifier attached to every indexed vector
pub type VectorId = u64;

/// Dense vector of fixed dimensionality
pub type Vector = Vec<f32>;

/// A single nearest-neighbor result, as returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// External identifier of the matched vector
    pub id: VectorId,
    /// Distance from the query under the index metric
    pub distance: f32,
}

impl SearchHit {
    pub fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }
}
