//! Per-user JSON document storage.
//!
//! Each user's document lives in its own file:
//! ```text
//! <DATA_DIR>/
//!   <user_id>.json
//! ```
//!
//! Writes go to a temp file first and are renamed into place, so a crash
//! mid-write never leaves a truncated document behind.

use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// Stored file is not a JSON object.
    CorruptDocument(PathBuf, String),
    /// Invalid user ID (e.g., contains path separators).
    InvalidUserId(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::CorruptDocument(path, e) => {
                write!(f, "Failed to load document {}: {}", path.display(), e)
            }
            ServerStorageError::InvalidUserId(id) => {
                write!(f, "Invalid user ID: {}", id)
            }
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Server-side storage for user documents.
#[derive(Debug, Clone)]
pub struct ServerStorage {
    data_dir: PathBuf,
}

impl ServerStorage {
    /// Creates a new server storage instance.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Validates a user ID to prevent path traversal attacks.
    pub fn validate_user_id(user_id: &str) -> Result<(), ServerStorageError> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.starts_with('.')
        {
            return Err(ServerStorageError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn doc_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", user_id))
    }

    /// Loads a user's document.
    ///
    /// Returns `Ok(None)` if the document doesn't exist yet.
    pub fn load(&self, user_id: &str) -> Result<Option<Map<String, Value>>, ServerStorageError> {
        Self::validate_user_id(user_id)?;

        let path = self.doc_path(user_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ServerStorageError::IoError(path, e)),
        };

        match serde_json::from_str(&text) {
            Ok(Value::Object(object)) => Ok(Some(object)),
            Ok(_) => Err(ServerStorageError::CorruptDocument(
                path,
                "not a JSON object".to_string(),
            )),
            Err(e) => Err(ServerStorageError::CorruptDocument(path, e.to_string())),
        }
    }

    /// Writes `patch` as the user's document and returns what is now stored.
    ///
    /// With `merge`, top-level fields of `patch` overwrite the stored ones and
    /// every other stored field is kept. Without it the document is replaced.
    pub fn put(
        &self,
        user_id: &str,
        patch: Map<String, Value>,
        merge: bool,
    ) -> Result<Map<String, Value>, ServerStorageError> {
        let document = if merge {
            let mut stored = self.load(user_id)?.unwrap_or_default();
            stored.extend(patch);
            stored
        } else {
            patch
        };

        self.save(user_id, &document)?;
        Ok(document)
    }

    /// Saves a user's document, creating the data directory if needed.
    pub fn save(
        &self,
        user_id: &str,
        document: &Map<String, Value>,
    ) -> Result<(), ServerStorageError> {
        Self::validate_user_id(user_id)?;

        fs::create_dir_all(&self.data_dir)
            .map_err(|e| ServerStorageError::IoError(self.data_dir.clone(), e))?;

        let path = self.doc_path(user_id);
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| ServerStorageError::CorruptDocument(path.clone(), e.to_string()))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        file.write_all(&bytes)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        file.sync_all()
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;

        fs::rename(&temp_path, &path).map_err(|e| ServerStorageError::IoError(path, e))?;

        Ok(())
    }
}
