use serde::{Deserialize, Serialize};

use super::column::Column;
use super::subject::Subject;

/// The whole persisted state: stage columns plus the subject tree.
///
/// A `Document` is always written wholesale, both to the local cache and to
/// the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub columns: Vec<Column>,
    pub subjects: Vec<Subject>,
}

impl Document {
    /// Creates an empty document (no subjects) with the given columns.
    pub fn with_columns(columns: Vec<Column>) -> Self {
        Self {
            columns,
            subjects: Vec::new(),
        }
    }

    /// The built-in columns of a first-use document.
    pub fn builtin_columns() -> Vec<Column> {
        vec![Column::new("c1", "Notes"), Column::new("c2", "Revision 1")]
    }

    pub fn with_subjects(mut self, subjects: Vec<Subject>) -> Self {
        self.subjects = subjects;
        self
    }

    pub fn subject(&self, subject_id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == subject_id)
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::with_columns(Self::builtin_columns())
    }
}

/// A document as read back from a backend, where either top-level field may
/// be missing (or `null`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDocument {
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub subjects: Option<Vec<Subject>>,
}

impl PartialDocument {
    /// Fills missing fields: columns from `default_columns`, subjects as empty.
    pub fn into_document(self, default_columns: &[Column]) -> Document {
        Document {
            columns: self.columns.unwrap_or_else(|| default_columns.to_vec()),
            subjects: self.subjects.unwrap_or_default(),
        }
    }
}

impl From<Document> for PartialDocument {
    fn from(doc: Document) -> Self {
        Self {
            columns: Some(doc.columns),
            subjects: Some(doc.subjects),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chapter;

    #[test]
    fn test_default_document() {
        let doc = Document::default();
        assert_eq!(doc.columns.len(), 2);
        assert_eq!(doc.columns[0].name, "Notes");
        assert!(doc.subjects.is_empty());
    }

    #[test]
    fn test_partial_fills_missing_columns() {
        let partial: PartialDocument =
            serde_json::from_str(r#"{"subjects":[{"id":"s1","name":"Math"}]}"#).unwrap();
        let doc = partial.into_document(&Document::builtin_columns());

        assert_eq!(doc.columns, Document::builtin_columns());
        assert_eq!(doc.subjects.len(), 1);
        assert!(doc.subjects[0].chapters.is_empty());
    }

    #[test]
    fn test_partial_null_subjects_become_empty() {
        let partial: PartialDocument =
            serde_json::from_str(r#"{"columns":[],"subjects":null}"#).unwrap();
        assert!(partial.subjects.is_none());

        let doc = partial.into_document(&Document::builtin_columns());
        assert!(doc.columns.is_empty());
        assert!(doc.subjects.is_empty());
    }

    #[test]
    fn test_document_lookup() {
        let doc = Document::default().with_subjects(vec![Subject::new("s1", "Math")
            .with_chapters(vec![Chapter::new("ch1", "Algebra")])]);

        assert!(doc.subject("s1").is_some());
        assert!(doc.subject("s2").is_none());
        assert_eq!(doc.column("c2").map(|c| c.name.as_str()), Some("Revision 1"));
        assert!(doc.subject("s1").unwrap().chapter("ch1").is_some());
    }
}
