//! HTTP server configuration

use serde::{Deserialize, Serialize};

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:5002")
    pub listen_addr: String,
    /// API keys for authentication (empty = no auth required)
    pub api_keys: Vec<String>,
    /// Enable CORS (useful for browser-based clients)
    pub cors_enabled: bool,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5002".to_string(),
            api_keys: Vec::new(),
            cors_enabled: false,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}
