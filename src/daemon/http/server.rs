//! HTTP API Server
//!
//! Axum-based HTTP server for the annserve REST API.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::Method;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;

use super::auth::AuthState;
use super::handlers::AppState;
use super::routes::create_router;

/// HTTP API server
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Router with CORS and request tracing applied
    pub fn app(&self) -> Router {
        let auth_state = AuthState::new(self.config.api_keys.clone());
        let mut app = create_router(self.state.clone(), auth_state, self.config.max_upload_bytes);

        if self.config.cors_enabled {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .allow_origin(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Serve until a shutdown signal arrives
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .context("Invalid HTTP listen address")?;

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        self.serve(listener, async move {
            let _ = shutdown.recv().await;
        })
        .await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!("HTTP API server listening on http://{}", local);

        axum::serve(listener, self.app())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("HTTP server shutting down");
            })
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}
