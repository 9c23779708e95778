//! Daemon Lifecycle Management
//!
//! Handles start-up (including restore-on-start), serving and graceful
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Config;

use super::http::{AppState, HttpServer};
use super::metrics::ServiceMetrics;
use super::service::QueryService;

/// How often resident memory is sampled for the metrics endpoint
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

/// How long servers get to drain after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Running service instance
pub struct Daemon {
    config: Config,
    service: Arc<QueryService>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    /// Create the query service and restore the configured index if present
    pub async fn start(config: Config) -> Result<Self> {
        info!("Starting annserve");

        let service = Arc::new(
            QueryService::with_metrics(
                config.index.hnsw_params(),
                config.index.ef_search,
                ServiceMetrics::shared(),
            )
            .context("Invalid index parameters")?,
        );

        if config.index.load_on_start {
            Self::restore_on_start(&config, service.clone()).await?;
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        info!(
            "Service initialized: metric={}, M={}, ef_construction={}, ef_search={}",
            config.index.metric, config.index.m, config.index.ef_construction, config.index.ef_search
        );

        Ok(Self {
            config,
            service,
            shutdown_tx,
        })
    }

    /// Load the index file in a blocking task; a broken file leaves the service empty
    async fn restore_on_start(config: &Config, service: Arc<QueryService>) -> Result<()> {
        let path = config.index.path.clone();
        if !path.exists() {
            info!("No index at {}, waiting for an upload", path.display());
            return Ok(());
        }

        let shown = path.display().to_string();
        let result = tokio::task::spawn_blocking(move || service.restore(&path))
            .await
            .context("Index restore task panicked")?;

        match result {
            Ok(stats) => info!("Restored {} vectors from {}", stats.vectors, shown),
            Err(e) => warn!(
                "Could not restore index from {}: {}. Starting without an index.",
                shown, e
            ),
        }
        Ok(())
    }

    pub fn service(&self) -> Arc<QueryService> {
        self.service.clone()
    }

    /// Sender that stops [`Daemon::run`] when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serve HTTP until Ctrl+C, SIGTERM or a shutdown message
    pub async fn run(&self) -> Result<()> {
        let shutdown_rx = self.shutdown_tx.subscribe();

        let metrics = self.service.metrics().clone();
        let mut shutdown_rx_memory = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => metrics.update_memory_usage(),
                    _ = shutdown_rx_memory.recv() => break,
                }
            }
        });

        let state = AppState::new(
            self.service.clone(),
            self.config.index.path.clone(),
            self.config.index.persist_on_rebuild,
        );
        let http_server = HttpServer::new(self.config.server.clone(), state);
        let shutdown_rx_http = self.shutdown_tx.subscribe();
        let mut http_handle = tokio::spawn(async move { http_server.run(shutdown_rx_http).await });

        let server_exited = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                None
            }
            _ = Self::wait_for_sigterm() => {
                info!("Received SIGTERM, shutting down");
                None
            }
            _ = Self::wait_for_shutdown(shutdown_rx) => {
                info!("Shutdown requested");
                None
            }
            result = &mut http_handle => Some(result),
        };

        let _ = self.shutdown_tx.send(());

        match server_exited {
            Some(Ok(Ok(()))) => info!("HTTP server shut down cleanly"),
            Some(Ok(Err(e))) => {
                error!("HTTP server failed: {:#}", e);
                return Err(e);
            }
            Some(Err(e)) => return Err(e).context("HTTP server task panicked"),
            None => {
                let abort = http_handle.abort_handle();
                match tokio::time::timeout(SHUTDOWN_GRACE, http_handle).await {
                    Ok(Ok(Ok(()))) => info!("HTTP server shut down cleanly"),
                    Ok(Ok(Err(e))) => error!("HTTP server failed: {:#}", e),
                    Ok(Err(e)) => error!("HTTP server task panicked: {}", e),
                    Err(_) => {
                        warn!("HTTP server did not shut down within {:?}, aborting", SHUTDOWN_GRACE);
                        abort.abort();
                    }
                }
            }
        }

        info!("annserve shutdown complete");
        Ok(())
    }

    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        std::future::pending::<()>().await
    }

    async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
        let _ = rx.recv().await;
    }
}
