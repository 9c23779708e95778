//! Daemon Module
//!
//! The long-running service: one [`QueryService`] owning the served index,
//! exposed over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     annserve daemon                       │
//! │                                                           │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │                   Query Service                      │  │
//! │  │   RwLock<Option<Arc<(HnswGraph, VectorStore)>>>      │  │
//! │  │   queries: snapshot + search, no lock held           │  │
//! │  │   rebuild/restore: build aside, swap under lock      │  │
//! │  └──────────────────────────┬──────────────────────────┘  │
//! │                             │                             │
//! │  ┌──────────────────────────┴──────────────────────────┐  │
//! │  │                 HTTP API (axum)                      │  │
//! │  │  /index_vectors  /vector/:id  /query  /stats         │  │
//! │  │  /index/save  /index/reload  /metrics  /health       │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! annserve serve --listen 0.0.0.0:5002
//! ```

pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod service;

pub use http::HttpServer;
pub use lifecycle::Daemon;
pub use metrics::{MetricsSnapshot, ServiceMetrics, Timer};
pub use service::{IndexOrigin, IndexStats, QueryService, RebuildSummary, ServedIndex};
