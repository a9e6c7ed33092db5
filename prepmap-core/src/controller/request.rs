//! Prompt and confirmation requests queued for the view.
//!
//! The controller never blocks on user input. Entry points that need a name
//! or a confirmation enqueue a [`Request`]; the view shows it however it likes
//! and hands back a [`Response`] through `SyncController::resolve`.

use std::fmt;

use crate::mutation::Mutation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The edit a request performs once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    AddSubject,
    RenameSubject { subject_id: String },
    DeleteSubject { subject_id: String },
    AddChapter { subject_id: String },
    RenameChapter { subject_id: String, chapter_id: String },
    DeleteChapter { subject_id: String, chapter_id: String },
    AddColumn,
    DeleteColumn { column_id: String },
}

impl PendingAction {
    /// Builds the mutation, using `name` for adds and renames.
    pub(crate) fn into_mutation(self, name: String) -> Mutation {
        match self {
            PendingAction::AddSubject => Mutation::AddSubject { name },
            PendingAction::RenameSubject { subject_id } => {
                Mutation::RenameSubject { subject_id, name }
            }
            PendingAction::DeleteSubject { subject_id } => Mutation::DeleteSubject { subject_id },
            PendingAction::AddChapter { subject_id } => Mutation::AddChapter { subject_id, name },
            PendingAction::RenameChapter {
                subject_id,
                chapter_id,
            } => Mutation::RenameChapter {
                subject_id,
                chapter_id,
                name,
            },
            PendingAction::DeleteChapter {
                subject_id,
                chapter_id,
            } => Mutation::DeleteChapter {
                subject_id,
                chapter_id,
            },
            PendingAction::AddColumn => Mutation::AddColumn { name },
            PendingAction::DeleteColumn { column_id } => Mutation::DeleteColumn { column_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask for a line of text.
    Prompt {
        id: RequestId,
        title: String,
        default_value: String,
        action: PendingAction,
    },
    /// Ask the user to confirm a destructive action.
    Confirm {
        id: RequestId,
        title: String,
        message: String,
        action: PendingAction,
    },
}

impl Request {
    pub fn id(&self) -> RequestId {
        match self {
            Request::Prompt { id, .. } | Request::Confirm { id, .. } => *id,
        }
    }
}

/// The view's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Text(String),
    Confirmed,
    Cancelled,
}
