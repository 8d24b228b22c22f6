//! HTTP and WebSocket front end.
//!
//! `/ws` carries the game protocol, one session per connection. `/health`
//! is for load balancers and smoke tests.

pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::session::SessionManager;

pub struct AppState {
    pub manager: Arc<SessionManager>,
}

/// Configuration for the game server.
pub struct ServerConfig {
    pub addr: String,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            dev_mode: false,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve until Ctrl+C.
pub async fn start_server(config: ServerConfig, manager: Arc<SessionManager>) -> Result<()> {
    let state = Arc::new(AppState { manager });
    let mut app = build_router(state.clone());

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, dev = config.dev_mode, "Werewolf server listening");
    println!("Werewolf server running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!(sessions = state.manager.len(), "Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
