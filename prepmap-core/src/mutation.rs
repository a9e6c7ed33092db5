//! Pure document mutations.
//!
//! Every user edit is a [`Mutation`] applied to the current [`Document`],
//! producing a new document. Nothing here touches a backend.

use thiserror::Error;

use crate::models::{Chapter, Column, Document, IdGenerator, Subject};

/// Errors returned when a mutation cannot be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),
}

/// A single user edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddSubject {
        name: String,
    },
    RenameSubject {
        subject_id: String,
        name: String,
    },
    DeleteSubject {
        subject_id: String,
    },
    AddChapter {
        subject_id: String,
        name: String,
    },
    RenameChapter {
        subject_id: String,
        chapter_id: String,
        name: String,
    },
    DeleteChapter {
        subject_id: String,
        chapter_id: String,
    },
    ToggleProgress {
        subject_id: String,
        chapter_id: String,
        column_id: String,
    },
    AddColumn {
        name: String,
    },
    DeleteColumn {
        column_id: String,
    },
    /// Replaces the whole document (backup import).
    ReplaceDocument(Document),
}

/// Result of applying a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub document: Document,
    /// Id of the entity created by an `Add*` mutation.
    pub created_id: Option<String>,
}

impl Applied {
    fn changed(document: Document) -> Self {
        Self {
            document,
            created_id: None,
        }
    }

    fn created(document: Document, id: String) -> Self {
        Self {
            document,
            created_id: Some(id),
        }
    }
}

impl Mutation {
    /// Applies the mutation to `doc`, returning the new document.
    ///
    /// `doc` itself is left untouched.
    pub fn apply(
        &self,
        doc: &Document,
        ids: &mut dyn IdGenerator,
    ) -> Result<Applied, MutationError> {
        let mut next = doc.clone();

        match self {
            Mutation::AddSubject { name } => {
                let name = non_empty(name)?;
                let id = ids.next_id();
                next.subjects.push(Subject::new(id.clone(), name));
                Ok(Applied::created(next, id))
            }
            Mutation::RenameSubject { subject_id, name } => {
                let name = non_empty(name)?;
                subject_mut(&mut next, subject_id)?.name = name;
                Ok(Applied::changed(next))
            }
            Mutation::DeleteSubject { subject_id } => {
                let before = next.subjects.len();
                next.subjects.retain(|s| &s.id != subject_id);
                if next.subjects.len() == before {
                    return Err(MutationError::SubjectNotFound(subject_id.clone()));
                }
                Ok(Applied::changed(next))
            }
            Mutation::AddChapter { subject_id, name } => {
                let name = non_empty(name)?;
                let subject = subject_mut(&mut next, subject_id)?;
                let id = ids.next_id();
                subject.chapters.push(Chapter::new(id.clone(), name));
                Ok(Applied::created(next, id))
            }
            Mutation::RenameChapter {
                subject_id,
                chapter_id,
                name,
            } => {
                let name = non_empty(name)?;
                chapter_mut(&mut next, subject_id, chapter_id)?.name = name;
                Ok(Applied::changed(next))
            }
            Mutation::DeleteChapter {
                subject_id,
                chapter_id,
            } => {
                let subject = subject_mut(&mut next, subject_id)?;
                let before = subject.chapters.len();
                subject.chapters.retain(|c| &c.id != chapter_id);
                if subject.chapters.len() == before {
                    return Err(MutationError::ChapterNotFound(chapter_id.clone()));
                }
                Ok(Applied::changed(next))
            }
            Mutation::ToggleProgress {
                subject_id,
                chapter_id,
                column_id,
            } => {
                if next.column(column_id).is_none() {
                    return Err(MutationError::ColumnNotFound(column_id.clone()));
                }
                let chapter = chapter_mut(&mut next, subject_id, chapter_id)?;
                let done = chapter.is_done(column_id);
                chapter.progress.insert(column_id.clone(), !done);
                Ok(Applied::changed(next))
            }
            Mutation::AddColumn { name } => {
                let name = non_empty(name)?;
                let id = ids.next_id();
                next.columns.push(Column::new(id.clone(), name));
                Ok(Applied::created(next, id))
            }
            Mutation::DeleteColumn { column_id } => {
                // Chapter progress keyed by this column is intentionally left alone.
                let before = next.columns.len();
                next.columns.retain(|c| &c.id != column_id);
                if next.columns.len() == before {
                    return Err(MutationError::ColumnNotFound(column_id.clone()));
                }
                Ok(Applied::changed(next))
            }
            Mutation::ReplaceDocument(document) => Ok(Applied::changed(document.clone())),
        }
    }
}

fn non_empty(name: &str) -> Result<String, MutationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MutationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

fn subject_mut<'a>(
    doc: &'a mut Document,
    subject_id: &str,
) -> Result<&'a mut Subject, MutationError> {
    doc.subjects
        .iter_mut()
        .find(|s| s.id == subject_id)
        .ok_or_else(|| MutationError::SubjectNotFound(subject_id.to_string()))
}

fn chapter_mut<'a>(
    doc: &'a mut Document,
    subject_id: &str,
    chapter_id: &str,
) -> Result<&'a mut Chapter, MutationError> {
    subject_mut(doc, subject_id)?
        .chapters
        .iter_mut()
        .find(|c| c.id == chapter_id)
        .ok_or_else(|| MutationError::ChapterNotFound(chapter_id.to_string()))
}
