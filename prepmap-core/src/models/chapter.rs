use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chapter with per-column completion flags.
///
/// `progress` is sparse: a missing column id means "not done". Entries for
/// deleted columns are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub progress: BTreeMap<String, bool>,
}

impl Chapter {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            progress: BTreeMap::new(),
        }
    }

    /// Returns whether the given column is checked for this chapter.
    pub fn is_done(&self, column_id: &str) -> bool {
        self.progress.get(column_id).copied().unwrap_or(false)
    }

    pub fn with_done(mut self, column_id: impl Into<String>) -> Self {
        self.progress.insert(column_id.into(), true);
        self
    }
}
