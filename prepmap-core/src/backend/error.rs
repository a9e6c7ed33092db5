//! Backend error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Local cache read/write failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error for {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
}

/// Remote data store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store refused access to the document (permissions or credentials).
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The store could not be reached or the connection dropped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store sent something that is not a document.
    #[error("Invalid document from store: {0}")]
    Decode(String),
}

/// Session provider failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Provider misconfiguration or rejected credentials.
    #[error("Session configuration error: {0}")]
    Configuration(String),

    /// The user backed out of signing in.
    #[error("Sign-in cancelled")]
    Cancelled,

    /// Temporary failure (e.g. identity server unreachable).
    #[error("Session provider unavailable: {0}")]
    Transient(String),
}
