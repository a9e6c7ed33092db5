//! Completion aggregates over the chapter × column matrix.

use crate::models::{Column, Document, Subject};

/// Count of checked `(chapter, column)` cells out of all cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    pub done: usize,
    pub total: usize,
}

impl Completion {
    /// Rounded percentage; 0 when there are no cells at all.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.done as f64 / self.total as f64) * 100.0).round() as u32
    }

    fn add(self, other: Completion) -> Completion {
        Completion {
            done: self.done + other.done,
            total: self.total + other.total,
        }
    }
}

/// Completion of one subject against the current columns.
///
/// Progress keys for columns that no longer exist are not counted.
pub fn subject_completion(subject: &Subject, columns: &[Column]) -> Completion {
    let total = subject.chapters.len() * columns.len();
    let done = subject
        .chapters
        .iter()
        .map(|chapter| columns.iter().filter(|c| chapter.is_done(&c.id)).count())
        .sum();
    Completion { done, total }
}

/// Completion across every subject of the document.
pub fn overall_completion(doc: &Document) -> Completion {
    doc.subjects
        .iter()
        .map(|s| subject_completion(s, &doc.columns))
        .fold(Completion::default(), Completion::add)
}
