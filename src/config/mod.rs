//! Configuration for annserve

mod index;
mod logging;
mod server;

pub use index::IndexConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use server::ServerConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "annserve.toml";

/// Main configuration for the service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// Defaults are not validated here so CLI overrides can be applied first.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file '{}'", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate all configuration fields.
    ///
    /// Collects every problem and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Index validation
        if self.index.m < 2 {
            errors.push(format!("index m must be at least 2, got {}", self.index.m));
        }
        if self.index.ef_construction == 0 {
            errors.push("ef_construction must be positive".to_string());
        }
        if self.index.ef_search == 0 {
            errors.push("ef_search must be positive".to_string());
        }
        if self.index.path.as_os_str().is_empty() {
            errors.push("index path must not be empty".to_string());
        }

        // Server validation
        if let Err(e) = validate_listen_addr(&self.server.listen_addr) {
            errors.push(e);
        }
        if self.server.max_upload_bytes == 0 {
            errors.push("max_upload_bytes must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn validate_listen_addr(addr: &str) -> std::result::Result<SocketAddr, String> {
    if let Some(port) = addr.rsplit(':').next().and_then(|p| p.parse::<u32>().ok()) {
        if port == 0 || port > 65535 {
            return Err(format!(
                "listen port must be between 1 and 65535, got {}",
                port
            ));
        }
    }
    addr.parse::<SocketAddr>()
        .map_err(|e| format!("invalid listen address '{}': {}", addr, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Metric;
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let cfg = valid_config();
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:5002");
        assert_eq!(cfg.index.path, PathBuf::from("index_optim.bin"));
        assert_eq!(cfg.index.metric, Metric::L2);
        assert_eq!(cfg.index.m, 16);
        assert_eq!(cfg.index.ef_construction, 200);
        assert_eq!(cfg.index.ef_search, 100);
        assert!(cfg.index.persist_on_rebuild);
        assert!(cfg.index.load_on_start);
        assert_eq!(cfg.logging.level, LogLevel::Info);
    }

    #[test]
    fn validate_rejects_small_m() {
        let mut cfg = valid_config();
        cfg.index.m = 1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("index m must be at least 2"));
    }

    #[test]
    fn validate_rejects_zero_ef() {
        let mut cfg = valid_config();
        cfg.index.ef_construction = 0;
        cfg.index.ef_search = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("ef_construction must be positive"));
        assert!(msg.contains("ef_search must be positive"));
    }

    #[test]
    fn validate_rejects_port_zero() {
        let mut cfg = valid_config();
        cfg.server.listen_addr = "0.0.0.0:0".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("listen port must be between 1 and 65535"));
    }

    #[test]
    fn validate_rejects_port_too_large() {
        let mut cfg = valid_config();
        cfg.server.listen_addr = "0.0.0.0:70000".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("listen port must be between 1 and 65535"));
    }

    #[test]
    fn validate_rejects_unparseable_address() {
        let mut cfg = valid_config();
        cfg.server.listen_addr = "localhost".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid listen address"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.index.m = 0;
        cfg.index.path = PathBuf::new();
        cfg.server.max_upload_bytes = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("index m must be at least 2"));
        assert!(msg.contains("index path must not be empty"));
        assert!(msg.contains("max_upload_bytes must be positive"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = Config::from_toml(
            r#"
            [index]
            metric = "cosine"
            m = 32
            seed = 42

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.index.metric, Metric::Cosine);
        assert_eq!(cfg.index.m, 32);
        assert_eq!(cfg.index.seed, Some(42));
        assert_eq!(cfg.index.ef_construction, 200);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.server.listen_addr, "127.0.0.1:5002");

        let params = cfg.index.hnsw_params();
        assert_eq!(params.m, 32);
        assert_eq!(params.seed, Some(42));
    }

    #[test]
    fn toml_round_trip_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);

        let mut cfg = valid_config();
        cfg.server.api_keys = vec!["k1".to_string()];
        cfg.index.seed = Some(7);
        std::fs::write(&path, cfg.to_toml().unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.api_keys, vec!["k1".to_string()]);
        assert_eq!(loaded.index.seed, Some(7));
    }

    #[test]
    fn load_reports_invalid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[index]\nm = 0\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn load_or_default_without_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.index.m, 16);
    }
}
