//! Local web UI and JSON API.

pub mod api;
pub mod browse;
pub mod error;
pub mod handlers;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, ServerConfig};
use crate::embed::ModelRegistry;
use crate::pipeline::MapContext;
use crate::session::Session;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Directory the config was loaded from; anchors the cache location.
    pub root: Arc<PathBuf>,
    pub registry: Arc<ModelRegistry>,
    pub session: Arc<Session>,
}

impl AppState {
    pub fn new(config: Config, root: PathBuf, registry: ModelRegistry) -> Self {
        Self {
            config: Arc::new(config),
            root: Arc::new(root),
            registry: Arc::new(registry),
            session: Arc::new(Session::new()),
        }
    }

    pub fn map_context(&self) -> MapContext {
        MapContext::from_config(&self.config, &self.root, Arc::clone(&self.registry))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/static/app.js", get(handlers::app_js))
        .route("/api/models", get(handlers::models))
        .route("/api/status", get(handlers::status))
        .route("/api/browse", post(handlers::browse))
        .route("/api/load-images", post(handlers::load_images))
        .route("/api/get-image/:id", get(handlers::get_image))
        .route("/api/export-labels", post(handlers::export_labels))
        .with_state(state)
        // Local tool: the UI may be opened from another origin during development.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured host and port. The host may be a name such as
/// `localhost` or a bare IPv4/IPv6 address.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn serve(state: AppState) -> Result<()> {
    let listener = bind(&state.config.server).await?;
    let addr = listener.local_addr().context("reading bound address")?;
    info!("constellate listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
