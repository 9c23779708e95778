//! Vector storage with external-id <-> node-index translation
//!
//! Vectors live in one flat row-major buffer. Node indices are dense and
//! assigned in insertion order, which is also the order the graph builder
//! inserts them in.

use std::collections::HashMap;

use super::error::{IndexError, IndexResult};
use crate::types::VectorId;

/// Read access to vectors by node index, as needed by graph traversal
pub trait VectorSource {
    /// Vector for a node index known to be in range
    fn vector(&self, node: usize) -> &[f32];
}

/// Append-only store of vectors and their external identifiers
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    /// Fixed by the first inserted vector
    dimensions: Option<usize>,
    /// Row-major vector data, `len() * dimensions` values
    data: Vec<f32>,
    /// node index -> external id
    ids: Vec<VectorId>,
    /// external id -> node index
    node_of: HashMap<VectorId, usize>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a known dimensionality and room for `capacity` rows
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            dimensions: Some(dimensions),
            data: Vec::with_capacity(dimensions * capacity),
            ids: Vec::with_capacity(capacity),
            node_of: HashMap::with_capacity(capacity),
        }
    }

    /// Append a vector, returning its node index
    pub fn put(&mut self, id: VectorId, vector: &[f32]) -> IndexResult<usize> {
        let dimensions = *self.dimensions.get_or_insert(vector.len());
        if vector.len() != dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                actual: vector.len(),
            });
        }
        if self.node_of.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        let node = self.ids.len();
        self.data.extend_from_slice(vector);
        self.ids.push(id);
        self.node_of.insert(id, node);
        Ok(node)
    }

    pub fn vector_of(&self, node: usize) -> IndexResult<&[f32]> {
        if node >= self.ids.len() {
            return Err(IndexError::unknown_node(node));
        }
        Ok(self.row(node))
    }

    pub fn node_index_of(&self, id: VectorId) -> IndexResult<usize> {
        self.node_of
            .get(&id)
            .copied()
            .ok_or_else(|| IndexError::unknown_id(id))
    }

    pub fn external_id_of(&self, node: usize) -> IndexResult<VectorId> {
        self.ids
            .get(node)
            .copied()
            .ok_or_else(|| IndexError::unknown_node(node))
    }

    /// Number of stored vectors
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dimensionality, or `None` before the first insertion
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// External ids in node-index order
    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }

    /// Iterate `(node index, external id, vector)` in node-index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, VectorId, &[f32])> + '_ {
        self.ids
            .iter()
            .enumerate()
            .map(move |(node, &id)| (node, id, self.row(node)))
    }

    fn row(&self, node: usize) -> &[f32] {
        let dimensions = self.dimensions.unwrap_or(0);
        let start = node * dimensions;
        &self.data[start..start + dimensions]
    }
}

impl VectorSource for VectorStore {
    fn vector(&self, node: usize) -> &[f32] {
        self.row(node)
    }
}
