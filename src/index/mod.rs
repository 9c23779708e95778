//! Approximate nearest-neighbor index (HNSW)
//!
//! Features:
//! - In-memory vector store with external id translation
//! - Hierarchical navigable small-world graph with seeded construction
//! - Squared-L2 and cosine metrics
//! - Single-file binary persistence with atomic saves

mod builder;
mod distance;
mod error;
mod hnsw;
mod persistence;
mod store;

pub use builder::*;
pub use distance::*;
pub use error::*;
pub use hnsw::*;
pub use persistence::*;
pub use store::*;
