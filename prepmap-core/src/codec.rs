//! Backup export and import.
//!
//! Exports are pretty-printed JSON of the full document. Imports accept any
//! JSON object that carries both `columns` and `subjects`; beyond decoding
//! into the model types nothing is validated.

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Column, Document, PartialDocument};

/// Prefix of backup file names.
pub const BACKUP_PREFIX: &str = "prepmap_backup_";

/// MIME type of backup files.
pub const BACKUP_MIME: &str = "application/json";

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Backup is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Backup is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("Backup has an unexpected shape: {0}")]
    InvalidShape(#[source] serde_json::Error),
}

/// Serializes the document as 2-space indented JSON.
pub fn export_document(doc: &Document) -> String {
    // Document only contains strings, vectors and maps with string keys.
    serde_json::to_string_pretty(doc).unwrap_or_default()
}

/// File name for a backup taken on `date`, e.g. `prepmap_backup_2025-01-31.json`.
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("{}{}.json", BACKUP_PREFIX, date.format("%Y-%m-%d"))
}

/// Parses backup text into a document.
pub fn import_document(text: &str, default_columns: &[Column]) -> Result<Document, ImportError> {
    let value: Value = serde_json::from_str(text).map_err(ImportError::InvalidJson)?;

    for field in ["columns", "subjects"] {
        match value.get(field) {
            Some(v) if !v.is_null() => {}
            _ => return Err(ImportError::MissingField(field)),
        }
    }

    let partial: PartialDocument =
        serde_json::from_value(value).map_err(ImportError::InvalidShape)?;
    Ok(partial.into_document(default_columns))
}
