//! HTTP server setup for the conda package server
//!
//! Every page is reachable both at the root and under the configured URL
//! prefix, so the server works behind a path-based reverse proxy as well as
//! on its own.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{config::Config, handlers, state::AppState, ui};

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.config.prefix.clone();
    let body_limit = state.config.max_upload_size_bytes();

    let mut router = package_routes(Router::new(), "");
    if !prefix.is_empty() {
        router = package_routes(router, &prefix).route(&prefix, get(ui::home));
    }

    router
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn package_routes(router: Router<Arc<AppState>>, base: &str) -> Router<Arc<AppState>> {
    router
        .route(&format!("{base}/"), get(ui::home))
        .route(&format!("{base}/upload"), post(handlers::upload))
        .route(&format!("{base}/pkgs"), get(ui::list_platforms))
        .route(&format!("{base}/pkgs/{{platform}}"), get(ui::list_packages))
        .route(
            &format!("{base}/pkgs/{{platform}}/{{filename}}"),
            get(handlers::download),
        )
        .route(
            &format!("{base}/delete/pkgs/{{platform}}/{{filename}}"),
            post(handlers::delete),
        )
        .route(
            &format!("{base}/anaconda/release/pkgs/{{platform}}/{{filename}}"),
            post(handlers::release),
        )
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "mirror": state.repo.mirror().bucket(),
        "release_enabled": state.repo.release_enabled(),
    }))
}

/// Prepare the package directories and serve until interrupted.
pub async fn run_server(config: Config) -> Result<()> {
    info!("Starting Poboys Conda Package Server");
    println!("🚀 Starting Poboys Conda Package Server...");

    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);
    let state = AppState::from_config(Arc::clone(&config)).await?;

    info!(pkgs_dir = %config.pkgs_dir().display(), "Using package directory");
    println!("📂 Using package directory: {}", config.pkgs_dir().display());

    if config.reindex_on_startup {
        println!("🔄 Indexing all platforms...");
        state
            .repo
            .bootstrap()
            .await
            .context("Initial index of the package directories failed")?;
    } else {
        state
            .repo
            .prepare_layout()
            .await
            .context("Failed to prepare the package directories")?;
    }

    let app = build_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid socket address {}:{}", config.host, config.port))?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {addr}: {e}")
    })?;

    println!("✅ Server is running on http://{addr}");
    if !config.prefix.is_empty() {
        println!("   Also under: http://{addr}{}/", config.prefix);
    }

    info!(addr = %addr, prefix = %config.prefix, "Server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("Server error: {e}")
        })?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
