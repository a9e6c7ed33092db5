//! Controller lifecycle for one CLI invocation.
//!
//! Every command that touches study data starts the controller, waits for
//! it to become Ready, runs, then flushes remote writes before exiting.

use std::sync::Arc;
use std::time::Duration;

use prepmap_core::backend::file::FileCache;
use prepmap_core::event::SnapshotSink;
use prepmap_core::{
    Backends, ControllerOptions, DataStore, Document, HttpDataStore, Mode, RemoteClient,
    RemoteError, RemoteSessionProvider, Subscription, SyncController, WriteMode,
};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::{Config, SyncConfig};

/// How long to wait for identity and the first snapshot.
const READY_TIMEOUT: Duration = Duration::from_secs(10);
/// How long to wait for queued remote writes on exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum AppError {
    Runtime(std::io::Error),
    Timeout,
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Runtime(e) => write!(f, "Failed to create runtime: {}", e),
            AppError::Timeout => write!(
                f,
                "Timed out after {}s waiting for study data to load",
                READY_TIMEOUT.as_secs()
            ),
        }
    }
}

impl std::error::Error for AppError {}

/// Builds a client if both server URL and API key are configured.
pub fn remote_client(sync: &SyncConfig) -> Option<RemoteClient> {
    match (&sync.server_url, &sync.api_key) {
        (Some(url), Some(key)) => Some(RemoteClient::new(url.clone(), key.clone())),
        _ => None,
    }
}

/// Store used when no server is configured. The session provider never
/// signs in without a server, so this only guards against misuse.
struct OfflineStore;

impl DataStore for OfflineStore {
    fn write(&self, key: &str, _document: &Document, _mode: WriteMode) {
        debug!("no sync server configured, dropping write to {}", key);
    }

    fn subscribe(&self, _key: &str, sink: SnapshotSink) -> Subscription {
        sink.fail(RemoteError::Transport(
            "No sync server configured".to_string(),
        ));
        Subscription::detached()
    }
}

pub struct App {
    runtime: Runtime,
    controller: SyncController,
    sessions: Arc<RemoteSessionProvider>,
    http: Option<Arc<HttpDataStore>>,
}

impl App {
    /// Starts the controller and waits until it is Ready.
    pub fn start(config: &Config) -> Result<Self, AppError> {
        Self::build(config, false)
    }

    /// Starts on local data even if a key is configured. Use [`App::sign_in`]
    /// to switch to the cloud copy.
    pub fn start_signed_out(config: &Config) -> Result<Self, AppError> {
        Self::build(config, true)
    }

    fn build(config: &Config, signed_out: bool) -> Result<Self, AppError> {
        let runtime = Runtime::new().map_err(AppError::Runtime)?;
        let client = remote_client(&config.sync);

        let (store, http): (Arc<dyn DataStore>, Option<Arc<HttpDataStore>>) = match &client {
            Some(client) => {
                let http = Arc::new(HttpDataStore::new(
                    client.clone(),
                    runtime.handle().clone(),
                ));
                let store: Arc<dyn DataStore> = http.clone();
                (store, Some(http))
            }
            None => (Arc::new(OfflineStore), None),
        };

        let sessions = Arc::new(if signed_out {
            RemoteSessionProvider::signed_out(client, runtime.handle().clone())
        } else {
            RemoteSessionProvider::new(client, runtime.handle().clone())
        });
        let backends = Backends {
            store,
            cache: Arc::new(FileCache::new(config.data_dir.value.clone())),
            sessions: sessions.clone(),
        };
        let options = ControllerOptions {
            default_columns: config.columns(),
        };

        let mut app = Self {
            runtime,
            controller: SyncController::new(backends, options),
            sessions,
            http,
        };
        app.controller.start();
        app.wait_ready()?;
        Ok(app)
    }

    fn wait_ready(&mut self) -> Result<(), AppError> {
        let Self {
            runtime,
            controller,
            ..
        } = self;
        runtime
            .block_on(async {
                tokio::time::timeout(READY_TIMEOUT, controller.run_until_ready()).await
            })
            .map_err(|_| AppError::Timeout)
    }

    /// Signs in and waits for the cloud document. A missing cloud document is
    /// seeded from the local data already loaded.
    ///
    /// Returns false if identity could not be resolved; the controller then
    /// stays on local data.
    pub fn sign_in(&mut self) -> Result<bool, AppError> {
        let Self {
            runtime,
            controller,
            sessions,
            ..
        } = self;
        controller.sign_in();
        runtime
            .block_on(async {
                tokio::time::timeout(READY_TIMEOUT, wait_signed_in(controller, sessions)).await
            })
            .map_err(|_| AppError::Timeout)
    }

    pub fn controller(&mut self) -> &mut SyncController {
        &mut self.controller
    }

    /// Handles events already delivered, e.g. after a sign-out.
    pub fn settle(&mut self) {
        self.controller.process_pending();
    }

    /// Calls `on_change` after every event until Ctrl-C.
    pub fn watch(&mut self, mut on_change: impl FnMut(&SyncController)) {
        let Self {
            runtime,
            controller,
            ..
        } = self;
        runtime.block_on(async {
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    more = controller.process_next() => {
                        if !more {
                            break;
                        }
                        on_change(&*controller);
                    }
                }
            }
        });
    }

    /// Waits for queued remote writes and prints any pending notice.
    pub fn finish(&mut self) {
        if let Some(http) = &self.http {
            let flushed = self
                .runtime
                .block_on(async { tokio::time::timeout(FLUSH_TIMEOUT, http.flush()).await });
            if flushed.is_err() {
                warn!("timed out waiting for remote writes");
            }
        }
        self.controller.process_pending();
        if let Some(notice) = self.controller.notice() {
            eprintln!("Notice: {}", notice);
        }
    }
}

/// Drives `controller` until it is Ready on the cloud document, or until the
/// identity lookup has failed.
async fn wait_signed_in(
    controller: &mut SyncController,
    sessions: &RemoteSessionProvider,
) -> bool {
    loop {
        controller.process_pending();
        let remote = matches!(controller.mode(), Mode::Remote(_));
        if remote && controller.is_ready() {
            return true;
        }
        if !remote && !sessions.is_resolving() {
            // The lookup's events are queued before it reports done
            if controller.process_pending() == 0 {
                return false;
            }
            continue;
        }
        if !controller.process_next().await {
            return false;
        }
    }
}
