//! HNSW (Hierarchical Navigable Small World) proximity graph
//!
//! The graph only knows node indices; vectors are read through a
//! [`VectorSource`] (normally the [`VectorStore`](super::VectorStore) the
//! graph was built from).
//!
//! - Every node lives on layer 0; a node drawn at level L also lives on layers 1..=L
//! - Upper layers are walked greedily, layer 0 with a bounded beam
//! - Neighbor lists are chosen with the diversity heuristic and kept symmetric:
//!   when a node prunes an edge, the other endpoint drops it as well

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use super::distance::Metric;
use super::error::{IndexError, IndexResult};
use super::store::VectorSource;

/// Highest layer a node can be assigned to
pub const MAX_LEVEL: usize = 16;

/// Graph construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Distance metric used for build and query
    pub metric: Metric,
    /// Degree cap on layers >= 1 (layer 0 allows 2 * m)
    pub m: usize,
    /// Beam width while inserting
    pub ef_construction: usize,
    /// Seed for layer assignment; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            metric: Metric::L2,
            m: 16,
            ef_construction: 200,
            seed: None,
        }
    }
}

impl HnswParams {
    pub fn validate(&self) -> IndexResult<()> {
        if self.m < 2 {
            return Err(IndexError::InvalidParams(format!(
                "m must be at least 2, got {}",
                self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(IndexError::InvalidParams(
                "ef_construction must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Degree cap for a layer
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    /// 1 / ln(M)
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// A graph search result in node-index space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphHit {
    pub node: usize,
    pub distance: f32,
}

/// Distance-ordered candidate; ties go to the smaller node index
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    node: usize,
}

impl Candidate {
    fn new(distance: f32, node: usize) -> Self {
        Self { distance, node }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl From<Candidate> for GraphHit {
    fn from(candidate: Candidate) -> Self {
        Self {
            node: candidate.node,
            distance: candidate.distance,
        }
    }
}

/// Per-node adjacency: `links[layer]` holds neighbor node indices
#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    links: Vec<Vec<usize>>,
}

impl Node {
    fn with_level(level: usize) -> Self {
        Self {
            links: vec![Vec::new(); level + 1],
        }
    }

    fn level(&self) -> usize {
        self.links.len() - 1
    }

    fn neighbors(&self, layer: usize) -> &[usize] {
        self.links.get(layer).map_or(&[][..], Vec::as_slice)
    }
}

/// Multi-layer proximity graph over dense node indices
#[derive(Debug, Clone)]
pub struct HnswGraph {
    params: HnswParams,
    dimensions: usize,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    max_layer: usize,
    rng: ChaCha8Rng,
}

impl HnswGraph {
    /// Create an empty graph; layer assignment is seeded from `params.seed`
    pub fn new(dimensions: usize, params: HnswParams) -> IndexResult<Self> {
        let rng = params.rng();
        Self::with_rng(dimensions, params, rng)
    }

    /// Create an empty graph drawing layers from the given random source
    pub fn with_rng(dimensions: usize, params: HnswParams, rng: ChaCha8Rng) -> IndexResult<Self> {
        params.validate()?;
        if dimensions == 0 {
            return Err(IndexError::InvalidParams(
                "dimensions must be positive".to_string(),
            ));
        }

        Ok(Self {
            params,
            dimensions,
            nodes: Vec::new(),
            entry_point: None,
            max_layer: 0,
            rng,
        })
    }

    /// Reassemble a graph from saved adjacency, checking it is structurally sound.
    ///
    /// `adjacency[node][layer]` lists the neighbors of `node` on `layer`.
    pub fn from_parts(
        dimensions: usize,
        params: HnswParams,
        adjacency: Vec<Vec<Vec<usize>>>,
        entry_point: Option<usize>,
        max_layer: usize,
    ) -> IndexResult<Self> {
        let corrupt = IndexError::CorruptFormat;
        params
            .validate()
            .map_err(|e| corrupt(format!("bad parameters: {}", e)))?;
        if dimensions == 0 {
            return Err(corrupt("dimensions must be positive".to_string()));
        }
        if max_layer > MAX_LEVEL {
            return Err(corrupt(format!(
                "max layer {} exceeds limit {}",
                max_layer, MAX_LEVEL
            )));
        }

        let count = adjacency.len();
        match entry_point {
            None if count > 0 => {
                return Err(corrupt("non-empty graph without an entry point".to_string()))
            }
            Some(entry) if entry >= count => {
                return Err(corrupt(format!(
                    "entry point {} out of range for {} nodes",
                    entry, count
                )))
            }
            _ => {}
        }

        let levels: Vec<usize> = adjacency.iter().map(Vec::len).collect();
        for (node, layers) in adjacency.iter().enumerate() {
            if layers.is_empty() || layers.len() > max_layer + 1 {
                return Err(corrupt(format!(
                    "node {} has {} layers, max layer is {}",
                    node,
                    layers.len(),
                    max_layer
                )));
            }
            for (layer, neighbors) in layers.iter().enumerate() {
                if neighbors.len() > params.max_degree(layer) {
                    return Err(corrupt(format!(
                        "node {} has {} neighbors on layer {} (cap {})",
                        node,
                        neighbors.len(),
                        layer,
                        params.max_degree(layer)
                    )));
                }
                for &neighbor in neighbors {
                    if neighbor >= count || neighbor == node || levels[neighbor] <= layer {
                        return Err(corrupt(format!(
                            "node {} links to invalid neighbor {} on layer {}",
                            node, neighbor, layer
                        )));
                    }
                }
            }
        }

        if let Some(entry) = entry_point {
            if levels[entry] != max_layer + 1 {
                return Err(corrupt(format!(
                    "entry point {} is not on max layer {}",
                    entry, max_layer
                )));
            }
        }

        Ok(Self {
            params,
            dimensions,
            nodes: adjacency.into_iter().map(|links| Node { links }).collect(),
            entry_point,
            max_layer,
            rng: params.rng(),
        })
    }

    /// Insert the next node.
    ///
    /// Nodes must arrive in ascending index order starting at 0, and `source`
    /// must already return `vector` for `node`.
    pub fn insert<S: VectorSource + ?Sized>(
        &mut self,
        node: usize,
        vector: &[f32],
        source: &S,
    ) -> IndexResult<()> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        assert_eq!(
            node,
            self.nodes.len(),
            "graph nodes must be inserted in ascending index order"
        );

        let level = self.random_level();
        self.nodes.push(Node::with_level(level));

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_layer = level;
            return Ok(());
        };

        let mut nearest = Candidate::new(self.distance(vector, source.vector(entry)), entry);
        for layer in (level + 1..=self.max_layer).rev() {
            nearest = self.greedy_closest(vector, nearest, layer, source);
        }

        let mut entry_points = vec![nearest];
        for layer in (0..=level.min(self.max_layer)).rev() {
            let candidates = self.search_layer(
                vector,
                &entry_points,
                self.params.ef_construction,
                layer,
                source,
            );
            let selected =
                self.select_neighbors(&candidates, self.params.max_degree(layer), source);

            self.nodes[node].links[layer] = selected.iter().map(|c| c.node).collect();
            for neighbor in &selected {
                self.connect(neighbor.node, node, layer, source);
            }

            entry_points = candidates;
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(node);
        }

        Ok(())
    }

    /// Approximate k nearest neighbors, nearest first.
    ///
    /// `ef` below `k` is raised to `k`.
    pub fn search<S: VectorSource + ?Sized>(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        source: &S,
    ) -> IndexResult<Vec<GraphHit>> {
        let Some(entry) = self.entry_point else {
            return Err(IndexError::EmptyIndex);
        };
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut nearest = Candidate::new(self.distance(query, source.vector(entry)), entry);
        for layer in (1..=self.max_layer).rev() {
            nearest = self.greedy_closest(query, nearest, layer, source);
        }

        let mut found = self.search_layer(query, &[nearest], ef.max(k), 0, source);
        found.truncate(k);

        Ok(found.into_iter().map(GraphHit::from).collect())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.params.metric
    }

    pub fn entry_point(&self) -> Option<usize> {
        self.entry_point
    }

    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Highest layer a node lives on
    pub fn node_level(&self, node: usize) -> Option<usize> {
        self.nodes.get(node).map(Node::level)
    }

    /// Neighbors of `node` on `layer` (empty if the node is not on that layer)
    pub fn neighbors(&self, node: usize, layer: usize) -> &[usize] {
        self.nodes.get(node).map_or(&[][..], |n| n.neighbors(layer))
    }

    /// All neighbor lists of a node, indexed by layer
    pub fn adjacency(&self, node: usize) -> &[Vec<usize>] {
        self.nodes.get(node).map_or(&[][..], |n| n.links.as_slice())
    }

    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.params.metric.distance(a, b)
    }

    /// floor(-ln(U) * mL) with U uniform on (0, 1]
    fn random_level(&mut self) -> usize {
        let uniform = 1.0 - self.rng.gen::<f64>();
        let level = (-uniform.ln() * self.params.level_multiplier()).floor();
        (level as usize).min(MAX_LEVEL)
    }

    /// Hill-climb on one layer until no neighbor is closer
    fn greedy_closest<S: VectorSource + ?Sized>(
        &self,
        query: &[f32],
        mut current: Candidate,
        layer: usize,
        source: &S,
    ) -> Candidate {
        loop {
            let mut improved = false;
            for &neighbor in self.nodes[current.node].neighbors(layer) {
                let candidate =
                    Candidate::new(self.distance(query, source.vector(neighbor)), neighbor);
                if candidate < current {
                    current = candidate;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first beam search on one layer; returns up to `ef` candidates, nearest first
    fn search_layer<S: VectorSource + ?Sized>(
        &self,
        query: &[f32],
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
        source: &S,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = entry_points.iter().map(|c| c.node).collect();
        let mut frontier: BinaryHeap<Reverse<Candidate>> =
            entry_points.iter().copied().map(Reverse).collect();
        let mut best: BinaryHeap<Candidate> = entry_points.iter().copied().collect();
        while best.len() > ef {
            best.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if best.len() >= ef && best.peek().is_some_and(|furthest| current > *furthest) {
                break;
            }

            for &neighbor in self.nodes[current.node].neighbors(layer) {
                if !visited.insert(neighbor) {
                    continue;
                }

                let candidate =
                    Candidate::new(self.distance(query, source.vector(neighbor)), neighbor);
                if best.len() < ef || best.peek().is_some_and(|furthest| candidate < *furthest) {
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// Diversity heuristic over candidates sorted nearest-first.
    ///
    /// A candidate is dropped only if some neighbor kept so far is strictly
    /// closer to it than the base point is. Ties are kept, so duplicate
    /// vectors do not shut out every other neighbor.
    fn select_neighbors<S: VectorSource + ?Sized>(
        &self,
        candidates: &[Candidate],
        cap: usize,
        source: &S,
    ) -> Vec<Candidate> {
        let mut selected: Vec<Candidate> = Vec::with_capacity(cap);
        for candidate in candidates {
            if selected.len() >= cap {
                break;
            }
            let vector = source.vector(candidate.node);
            let diverse = selected
                .iter()
                .all(|kept| self.distance(vector, source.vector(kept.node)) >= candidate.distance);
            if diverse {
                selected.push(*candidate);
            }
        }
        selected
    }

    /// Add `neighbor` to `node`'s list on `layer`, pruning back to the cap if needed
    fn connect<S: VectorSource + ?Sized>(
        &mut self,
        node: usize,
        neighbor: usize,
        layer: usize,
        source: &S,
    ) {
        let cap = self.params.max_degree(layer);
        self.nodes[node].links[layer].push(neighbor);
        if self.nodes[node].links[layer].len() <= cap {
            return;
        }

        let base = source.vector(node);
        let mut candidates: Vec<Candidate> = self.nodes[node].links[layer]
            .iter()
            .map(|&n| Candidate::new(self.distance(base, source.vector(n)), n))
            .collect();
        candidates.sort();

        let kept: Vec<usize> = self
            .select_neighbors(&candidates, cap, source)
            .into_iter()
            .map(|c| c.node)
            .collect();
        let dropped: Vec<usize> = candidates
            .iter()
            .map(|c| c.node)
            .filter(|n| !kept.contains(n))
            .collect();

        self.nodes[node].links[layer] = kept;
        for other in dropped {
            self.nodes[other].links[layer].retain(|&n| n != node);
        }

        assert!(
            self.nodes[node].links[layer].len() <= cap,
            "node {} exceeds degree cap {} on layer {} after pruning",
            node,
            cap,
            layer
        );
    }
}
