//! HTTP and WebSocket surface of the PrepMap document server.

pub mod auth;
pub mod hub;
pub mod routes;
pub mod storage;

pub use auth::ApiKeyStore;
pub use hub::WatchHub;
pub use routes::router;
pub use storage::ServerStorage;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub storage: Arc<RwLock<ServerStorage>>,
    pub hub: Arc<WatchHub>,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, storage: ServerStorage) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            storage: Arc::new(RwLock::new(storage)),
            hub: Arc::new(WatchHub::new()),
        }
    }
}
