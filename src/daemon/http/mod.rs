//! HTTP API Server Module
//!
//! REST API over the query service: upload-and-rebuild, neighbor queries,
//! persistence controls, stats and Prometheus metrics.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use server::HttpServer;
