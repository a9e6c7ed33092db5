//! Property-test generators for documents and edit sequences.
//!
//! Edits are generated against positions rather than ids, then resolved
//! against whatever the document holds at that point, so every generated
//! sequence is applicable.

use proptest::prelude::*;

use crate::models::{Document, SequentialIds};
use crate::mutation::Mutation;

/// An edit addressed by position. Positions wrap around the current lengths.
#[derive(Debug, Clone)]
pub enum Edit {
    AddSubject(String),
    RenameSubject(usize, String),
    DeleteSubject(usize),
    AddChapter(usize, String),
    RenameChapter(usize, usize, String),
    DeleteChapter(usize, usize),
    Toggle(usize, usize, usize),
    AddColumn(String),
    DeleteColumn(usize),
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,11}").expect("Invalid regex")
}

pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    let index = || 0..8usize;
    prop_oneof![
        3 => name_strategy().prop_map(Edit::AddSubject),
        1 => (index(), name_strategy()).prop_map(|(s, n)| Edit::RenameSubject(s, n)),
        1 => index().prop_map(Edit::DeleteSubject),
        4 => (index(), name_strategy()).prop_map(|(s, n)| Edit::AddChapter(s, n)),
        1 => (index(), index(), name_strategy()).prop_map(|(s, c, n)| Edit::RenameChapter(s, c, n)),
        1 => (index(), index()).prop_map(|(s, c)| Edit::DeleteChapter(s, c)),
        5 => (index(), index(), index()).prop_map(|(s, c, k)| Edit::Toggle(s, c, k)),
        1 => name_strategy().prop_map(Edit::AddColumn),
        1 => index().prop_map(Edit::DeleteColumn),
    ]
}

pub fn edits_strategy() -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), 0..60)
}

fn nth<T>(items: &[T], index: usize) -> Option<&T> {
    if items.is_empty() {
        None
    } else {
        items.get(index % items.len())
    }
}

impl Edit {
    /// The concrete mutation this edit means for `doc`, if its targets exist.
    pub fn resolve(&self, doc: &Document) -> Option<Mutation> {
        let subject = move |s: usize| nth(&doc.subjects, s);
        let chapter = move |s: usize, c: usize| {
            let subject = subject(s)?;
            Some((subject.id.clone(), nth(&subject.chapters, c)?.id.clone()))
        };

        let mutation = match self {
            Edit::AddSubject(name) => Mutation::AddSubject { name: name.clone() },
            Edit::RenameSubject(s, name) => Mutation::RenameSubject {
                subject_id: subject(*s)?.id.clone(),
                name: name.clone(),
            },
            Edit::DeleteSubject(s) => Mutation::DeleteSubject {
                subject_id: subject(*s)?.id.clone(),
            },
            Edit::AddChapter(s, name) => Mutation::AddChapter {
                subject_id: subject(*s)?.id.clone(),
                name: name.clone(),
            },
            Edit::RenameChapter(s, c, name) => {
                let (subject_id, chapter_id) = chapter(*s, *c)?;
                Mutation::RenameChapter {
                    subject_id,
                    chapter_id,
                    name: name.clone(),
                }
            }
            Edit::DeleteChapter(s, c) => {
                let (subject_id, chapter_id) = chapter(*s, *c)?;
                Mutation::DeleteChapter {
                    subject_id,
                    chapter_id,
                }
            }
            Edit::Toggle(s, c, k) => {
                let (subject_id, chapter_id) = chapter(*s, *c)?;
                Mutation::ToggleProgress {
                    subject_id,
                    chapter_id,
                    column_id: nth(&doc.columns, *k)?.id.clone(),
                }
            }
            Edit::AddColumn(name) => Mutation::AddColumn { name: name.clone() },
            Edit::DeleteColumn(k) => Mutation::DeleteColumn {
                column_id: nth(&doc.columns, *k)?.id.clone(),
            },
        };
        Some(mutation)
    }
}

/// Applies `edits` to the default document, skipping ones with no target.
pub fn build_document(edits: &[Edit]) -> Document {
    let mut ids = SequentialIds::new("g");
    let mut doc = Document::default();
    for edit in edits {
        if let Some(mutation) = edit.resolve(&doc) {
            if let Ok(applied) = mutation.apply(&doc, &mut ids) {
                doc = applied.document;
            }
        }
    }
    doc
}

/// Documents reachable from the default document through user edits.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    edits_strategy().prop_map(|edits| build_document(&edits))
}
