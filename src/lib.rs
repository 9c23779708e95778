//! annserve: Approximate Nearest-Neighbor Search Service
//!
//! An HNSW graph index over dense float vectors, featuring:
//! - Seedable, deterministic index builds (L2 or cosine distance)
//! - A versioned little-endian binary index format with atomic saves
//! - Lock-free query snapshots while a rebuild runs aside
//! - Bulk import of whitespace-separated vector tables and id lists
//! - An HTTP API (axum) with optional API key auth and Prometheus metrics

pub mod config;
pub mod daemon;
pub mod import;
pub mod index;
pub mod types;

pub use config::Config;
pub use types::*;
