//! PrepMap document server.
//!
//! Stores one JSON document per user and pushes every change to the user's
//! open watch connections. See [`config`] for configuration.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /me`: Returns the user the API key belongs to
//! - `GET /documents/{user_id}`: Stored document, 404 if none yet
//! - `PUT /documents/{user_id}?merge=true|false`: Replace or merge the document
//! - `GET /documents/{user_id}/watch?key=<api key>`: WebSocket of snapshots

mod config;
mod server;

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use server::{router, ApiKeyStore, AppState, ServerStorage};

async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prepmap_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let api_keys = ApiKeyStore::load(&config.config_path);
    let state = AppState::new(api_keys, ServerStorage::new(&config.data_dir));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(listener, state).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
