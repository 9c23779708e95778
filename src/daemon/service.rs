//! Query Service
//!
//! Owns the served (graph, store) pair. Queries take a reference-counted
//! snapshot under a brief read lock and search without holding it; rebuild
//! and restore prepare a new pair off to the side and swap it in under a
//! brief write lock.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::index::{
    HnswGraph, HnswParams, IndexBuilder, IndexError, IndexResult, Metric, PersistenceCodec,
    VectorStore,
};
use crate::types::{SearchHit, Vector, VectorId};

use super::metrics::{ServiceMetrics, Timer};

/// How the served index came to be
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Built,
    Loaded { path: String },
}

/// A graph together with the store it was built over
#[derive(Debug)]
pub struct ServedIndex {
    pub store: VectorStore,
    pub graph: HnswGraph,
    pub origin: IndexOrigin,
    pub ready_at: DateTime<Utc>,
}

impl ServedIndex {
    fn search(&self, vector: &[f32], k: usize, ef: usize) -> IndexResult<Vec<SearchHit>> {
        self.graph
            .search(vector, k, ef, &self.store)?
            .into_iter()
            .map(|hit| Ok(SearchHit::new(self.store.external_id_of(hit.node)?, hit.distance)))
            .collect()
    }
}

/// Outcome of a successful rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub vectors_indexed: usize,
    pub dimensions: usize,
    pub max_layer: usize,
    pub duration_ms: u64,
}

/// Description of the served index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub loaded: bool,
    pub vectors: usize,
    pub dimensions: Option<usize>,
    pub metric: Metric,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layer: Option<usize>,
    pub entry_point: Option<VectorId>,
    pub origin: Option<IndexOrigin>,
    pub ready_at: Option<DateTime<Utc>>,
}

/// Build, load and query operations over one served index
pub struct QueryService {
    params: HnswParams,
    ef_search: usize,
    served: RwLock<Option<Arc<ServedIndex>>>,
    /// Serializes rebuild, restore and persist
    write_lock: Mutex<()>,
    metrics: Arc<ServiceMetrics>,
}

impl QueryService {
    pub fn new(params: HnswParams, ef_search: usize) -> IndexResult<Self> {
        Self::with_metrics(params, ef_search, ServiceMetrics::shared())
    }

    pub fn with_metrics(
        params: HnswParams,
        ef_search: usize,
        metrics: Arc<ServiceMetrics>,
    ) -> IndexResult<Self> {
        params.validate()?;
        if ef_search == 0 {
            return Err(IndexError::InvalidParams(
                "ef_search must be positive".to_string(),
            ));
        }
        Ok(Self {
            params,
            ef_search,
            served: RwLock::new(None),
            write_lock: Mutex::new(()),
            metrics,
        })
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    pub fn is_loaded(&self) -> bool {
        self.served.read().is_some()
    }

    /// Current served pair, if any
    pub fn snapshot(&self) -> Option<Arc<ServedIndex>> {
        self.served.read().clone()
    }

    fn require_snapshot(&self) -> IndexResult<Arc<ServedIndex>> {
        self.snapshot().ok_or(IndexError::NoIndexLoaded)
    }

    fn swap_in(&self, index: ServedIndex) {
        let vectors = index.store.size();
        *self.served.write() = Some(Arc::new(index));
        self.metrics.vectors_indexed.set(vectors as u64);
    }

    /// Replace the served index with one built over `rows`, in row order.
    ///
    /// On failure the previously served index stays in place.
    pub fn rebuild(&self, rows: Vec<(VectorId, Vector)>) -> IndexResult<RebuildSummary> {
        let _guard = self.write_lock.lock();
        let timer = Timer::start();

        let result = self.build_pair(rows);
        let elapsed = timer.record(&self.metrics.rebuild_latency);

        match result {
            Ok(index) => {
                self.metrics.rebuilds_total.inc();
                let summary = RebuildSummary {
                    vectors_indexed: index.store.size(),
                    dimensions: index.graph.dimensions(),
                    max_layer: index.graph.max_layer(),
                    duration_ms: elapsed.as_millis() as u64,
                };
                self.swap_in(index);
                info!(
                    "Rebuilt index: {} vectors, {} dimensions in {}ms",
                    summary.vectors_indexed, summary.dimensions, summary.duration_ms
                );
                Ok(summary)
            }
            Err(e) => {
                self.metrics.rebuilds_failed.inc();
                warn!("Rebuild failed, keeping current index: {}", e);
                Err(e)
            }
        }
    }

    fn build_pair(&self, rows: Vec<(VectorId, Vector)>) -> IndexResult<ServedIndex> {
        let Some((_, first)) = rows.first() else {
            return Err(IndexError::EmptyInput);
        };

        let mut store = VectorStore::with_capacity(first.len(), rows.len());
        for (id, vector) in &rows {
            store.put(*id, vector)?;
        }
        drop(rows);

        let graph = IndexBuilder::new(self.params).build(&store)?;
        Ok(ServedIndex {
            store,
            graph,
            origin: IndexOrigin::Built,
            ready_at: Utc::now(),
        })
    }

    /// Nearest neighbors of a stored vector, nearest first (the vector itself included)
    pub fn query(&self, id: VectorId, k: usize) -> IndexResult<Vec<SearchHit>> {
        self.query_with_ef(id, k, self.ef_search)
    }

    pub fn query_with_ef(&self, id: VectorId, k: usize, ef: usize) -> IndexResult<Vec<SearchHit>> {
        self.observe_query(|| {
            let index = self.require_snapshot()?;
            let node = index.store.node_index_of(id)?;
            let vector = index.store.vector_of(node)?;
            debug!("Query by id {} (k={}, ef={})", id, k, ef);
            index.search(vector, k, ef)
        })
    }

    /// Nearest neighbors of an arbitrary vector, nearest first
    pub fn query_by_vector(
        &self,
        vector: &[f32],
        k: usize,
        ef: Option<usize>,
    ) -> IndexResult<Vec<SearchHit>> {
        let ef = ef.unwrap_or(self.ef_search);
        self.observe_query(|| {
            let index = self.require_snapshot()?;
            debug!("Query by vector (k={}, ef={})", k, ef);
            index.search(vector, k, ef)
        })
    }

    fn observe_query<F>(&self, run: F) -> IndexResult<Vec<SearchHit>>
    where
        F: FnOnce() -> IndexResult<Vec<SearchHit>>,
    {
        let timer = Timer::start();
        self.metrics.queries_total.inc();
        let result = run();
        timer.record(&self.metrics.query_latency);
        if result.is_err() {
            self.metrics.queries_failed.inc();
        }
        result
    }

    /// Save the served index to `path`
    pub fn persist(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let _guard = self.write_lock.lock();
        let index = self.require_snapshot()?;
        match PersistenceCodec::save(&index.graph, &index.store, path) {
            Ok(()) => {
                self.metrics.persists_total.inc();
                Ok(())
            }
            Err(e) => {
                self.metrics.persists_failed.inc();
                Err(e)
            }
        }
    }

    /// Replace the served index with one loaded from `path`.
    ///
    /// On failure the previously served index stays in place.
    pub fn restore(&self, path: impl AsRef<Path>) -> IndexResult<IndexStats> {
        let path = path.as_ref();
        let _guard = self.write_lock.lock();

        let (graph, store) = PersistenceCodec::load(path).inspect_err(|e| {
            self.metrics.restores_failed.inc();
            warn!("Failed to load index from {}: {}", path.display(), e);
        })?;

        if graph.metric() != self.params.metric {
            warn!(
                "Loaded index uses metric {} while {} is configured; queries follow the file",
                graph.metric(),
                self.params.metric
            );
        }

        self.swap_in(ServedIndex {
            store,
            graph,
            origin: IndexOrigin::Loaded {
                path: path.display().to_string(),
            },
            ready_at: Utc::now(),
        });
        self.metrics.restores_total.inc();
        Ok(self.stats())
    }

    pub fn stats(&self) -> IndexStats {
        match self.snapshot() {
            Some(index) => {
                let params = index.graph.params();
                IndexStats {
                    loaded: true,
                    vectors: index.store.size(),
                    dimensions: Some(index.graph.dimensions()),
                    metric: params.metric,
                    m: params.m,
                    ef_construction: params.ef_construction,
                    ef_search: self.ef_search,
                    max_layer: Some(index.graph.max_layer()),
                    entry_point: index
                        .graph
                        .entry_point()
                        .and_then(|node| index.store.external_id_of(node).ok()),
                    origin: Some(index.origin.clone()),
                    ready_at: Some(index.ready_at),
                }
            }
            None => IndexStats {
                loaded: false,
                vectors: 0,
                dimensions: None,
                metric: self.params.metric,
                m: self.params.m,
                ef_construction: self.params.ef_construction,
                ef_search: self.ef_search,
                max_layer: None,
                entry_point: None,
                origin: None,
                ready_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service() -> QueryService {
        let params = HnswParams {
            metric: Metric::L2,
            m: 8,
            ef_construction: 64,
            seed: Some(11),
        };
        QueryService::new(params, 32).unwrap()
    }

    fn square() -> Vec<(VectorId, Vector)> {
        vec![
            (1, vec![0.0, 0.0]),
            (2, vec![1.0, 0.0]),
            (3, vec![0.0, 1.0]),
            (4, vec![5.0, 5.0]),
        ]
    }

    #[test]
    fn test_new_rejects_bad_params() {
        assert!(matches!(
            QueryService::new(HnswParams::default(), 0),
            Err(IndexError::InvalidParams(_))
        ));
        let params = HnswParams {
            m: 0,
            ..HnswParams::default()
        };
        assert!(QueryService::new(params, 10).is_err());
    }

    #[test]
    fn test_query_before_build() {
        let service = service();
        assert!(!service.is_loaded());
        assert!(matches!(service.query(1, 1), Err(IndexError::NoIndexLoaded)));
        assert!(matches!(
            service.query_by_vector(&[0.0], 1, None),
            Err(IndexError::NoIndexLoaded)
        ));
        assert!(matches!(
            service.persist("unused.bin"),
            Err(IndexError::NoIndexLoaded)
        ));
        assert_eq!(service.metrics().queries_failed.get(), 2);
    }

    #[test]
    fn test_rebuild_and_query_tie_break() {
        let service = service();
        let summary = service.rebuild(square()).unwrap();
        assert_eq!(summary.vectors_indexed, 4);
        assert_eq!(summary.dimensions, 2);

        let hits = service.query(1, 2).unwrap();
        assert_eq!(hits, vec![SearchHit::new(1, 0.0), SearchHit::new(2, 1.0)]);
        assert_eq!(service.metrics().vectors_indexed.get(), 4);
    }

    #[test]
    fn test_query_unknown_id() {
        let service = service();
        service.rebuild(square()).unwrap();
        assert!(matches!(service.query(99, 1), Err(IndexError::NotFound(_))));
    }

    #[test]
    fn test_query_by_vector_dimension_mismatch() {
        let service = service();
        service.rebuild(square()).unwrap();
        assert!(matches!(
            service.query_by_vector(&[1.0, 2.0, 3.0], 1, None),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));

        let hits = service.query_by_vector(&[4.0, 4.0], 1, Some(1)).unwrap();
        assert_eq!(hits[0].id, 4);
    }

    #[test]
    fn test_failed_rebuild_keeps_served_index() {
        let service = service();
        service.rebuild(square()).unwrap();

        assert!(matches!(service.rebuild(Vec::new()), Err(IndexError::EmptyInput)));
        assert!(matches!(
            service.rebuild(vec![(1, vec![0.0, 0.0]), (2, vec![1.0])]),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            service.rebuild(vec![(1, vec![0.0]), (1, vec![1.0])]),
            Err(IndexError::DuplicateId(1))
        ));

        assert_eq!(service.query(4, 1).unwrap()[0].id, 4);
        assert_eq!(service.stats().vectors, 4);
        assert_eq!(service.metrics().rebuilds_failed.get(), 3);
        assert_eq!(service.metrics().rebuilds_total.get(), 1);
    }

    #[test]
    fn test_persist_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.bin");

        let service = service();
        service.rebuild(square()).unwrap();
        service.persist(&path).unwrap();

        let restored = self::service();
        let stats = restored.restore(&path).unwrap();
        assert!(stats.loaded);
        assert_eq!(stats.vectors, 4);
        assert_eq!(
            stats.origin,
            Some(IndexOrigin::Loaded {
                path: path.display().to_string()
            })
        );
        assert_eq!(restored.query(1, 2).unwrap(), service.query(1, 2).unwrap());
    }

    #[test]
    fn test_failed_restore_keeps_served_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.bin");
        std::fs::write(&path, b"not an index").unwrap();

        let service = service();
        service.rebuild(square()).unwrap();
        assert!(matches!(
            service.restore(&path),
            Err(IndexError::CorruptFormat(_))
        ));
        assert!(matches!(
            service.restore(temp_dir.path().join("missing.bin")),
            Err(IndexError::Io(_))
        ));
        assert_eq!(service.query(2, 1).unwrap()[0].id, 2);
        assert_eq!(service.metrics().restores_failed.get(), 2);
    }

    #[test]
    fn test_stats_without_index() {
        let stats = service().stats();
        assert!(!stats.loaded);
        assert_eq!(stats.vectors, 0);
        assert_eq!(stats.m, 8);
        assert_eq!(stats.ef_search, 32);
    }
}
