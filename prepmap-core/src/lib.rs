//! PrepMap Core Library
//!
//! Study progress model, the sync controller and its backends.

pub mod backend;
pub mod codec;
pub mod controller;
pub mod event;
pub mod models;
pub mod mutation;
pub mod progress;
pub mod remote;

#[cfg(test)]
mod strategies;

pub use backend::{
    CacheError, DataStore, LocalCache, RemoteError, SessionError, SessionProvider, Subscription,
    WriteMode, LOCAL_CACHE_KEY,
};
pub use codec::{backup_file_name, export_document, import_document, ImportError};
pub use controller::{
    Backends, Backup, ControllerError, ControllerOptions, Mode, Notice, NoticeKind,
    PendingAction, Request, RequestId, Response, SyncController, SyncState,
};
pub use event::{Session, SubscriptionId, SyncEvent};
pub use models::{Chapter, Column, Document, PartialDocument, Subject};
pub use mutation::{Mutation, MutationError};
pub use progress::Completion;
pub use remote::{check_server, HttpDataStore, RemoteClient, RemoteSessionProvider};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
