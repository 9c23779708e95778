//! Bulk construction of an HNSW graph from a populated vector store

use std::time::Instant;

use tracing::{debug, info};

use super::error::{IndexError, IndexResult};
use super::hnsw::{HnswGraph, HnswParams};
use super::store::VectorStore;

/// Log build progress every this many insertions
const PROGRESS_INTERVAL: usize = 10_000;

/// Builds a fresh graph by inserting every stored vector in node-index order
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    params: HnswParams,
}

impl IndexBuilder {
    pub fn new(params: HnswParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Build a graph over all vectors in `store`
    pub fn build(&self, store: &VectorStore) -> IndexResult<HnswGraph> {
        let dimensions = match store.dimensions() {
            Some(d) if !store.is_empty() => d,
            _ => return Err(IndexError::EmptyInput),
        };

        let start = Instant::now();
        info!(
            "Building HNSW graph: {} vectors, {} dimensions, metric={}, M={}, ef_construction={}",
            store.size(),
            dimensions,
            self.params.metric,
            self.params.m,
            self.params.ef_construction
        );

        let mut graph = HnswGraph::new(dimensions, self.params)?;
        for (node, _, vector) in store.iter() {
            graph.insert(node, vector, store)?;

            let inserted = node + 1;
            if inserted % PROGRESS_INTERVAL == 0 {
                debug!("Inserted {}/{} vectors", inserted, store.size());
            }
        }

        info!(
            "Built HNSW graph in {}ms: {} nodes, max layer {}",
            start.elapsed().as_millis(),
            graph.len(),
            graph.max_layer()
        );

        Ok(graph)
    }
}
