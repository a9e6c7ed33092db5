//! Backend seams of the sync controller.
//!
//! The controller talks to three collaborators, all injected at construction:
//! - [`DataStore`]: per-user remote documents with change notification
//! - [`LocalCache`]: one JSON slot on this device
//! - [`SessionProvider`]: signed-in / signed-out identity
//!
//! In-memory implementations live in [`memory`], the file-backed cache in
//! [`file`], and the HTTP store in [`crate::remote`].

mod error;
pub mod file;
pub mod memory;

pub use error::{CacheError, RemoteError, SessionError};

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::event::{IdentitySink, SnapshotSink};
use crate::models::Document;

/// Key of the single local cache slot.
pub const LOCAL_CACHE_KEY: &str = "prepMapData_local";

/// How a remote write combines with the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the `columns` and `subjects` fields, keep anything else.
    Merge,
    /// Replace the stored document entirely.
    Replace,
}

/// Remote per-user document store.
pub trait DataStore: Send + Sync {
    /// Writes `document` under `key`. Fire-and-forget: failures are the
    /// store's to log, never reported back.
    fn write(&self, key: &str, document: &Document, mode: WriteMode);

    /// Starts watching `key`. The store delivers the current snapshot to
    /// `sink` right away and again after every change, until the returned
    /// handle is dropped or the subscription fails.
    fn subscribe(&self, key: &str, sink: SnapshotSink) -> Subscription;
}

/// Device-local storage for one serialized document.
pub trait LocalCache: Send + Sync {
    fn read(&self) -> Result<Option<String>, CacheError>;
    fn write(&self, text: &str) -> Result<(), CacheError>;
}

/// Source of the current identity.
pub trait SessionProvider: Send + Sync {
    /// Registers `sink`. Implementations report the current identity
    /// immediately (or once resolved) and again on every change.
    fn attach(&self, sink: IdentitySink);

    /// Starts signing in. Completion arrives through the attached sink.
    fn sign_in(&self) -> Result<(), SessionError>;

    /// Signs out. Completion arrives through the attached sink.
    fn sign_out(&self) -> Result<(), SessionError>;
}

/// Locks `mutex`, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for a live data store subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel (e.g. the subscription failed at once).
    pub fn detached() -> Self {
        Self { cancel: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
