mod auth;
mod backup;
mod chapter;
mod column;
mod config_cmd;
mod progress;
mod subject;

pub use auth::AuthCommand;
pub use backup::{ExportCommand, ImportCommand};
pub use chapter::ChapterCommand;
pub use column::ColumnCommand;
pub use config_cmd::ConfigCommand;
pub use progress::{print_summary, ShowCommand, StatusCommand, ToggleCommand};
pub use subject::SubjectCommand;

use std::io::{self, Write};

use clap::ValueEnum;
use prepmap_core::{
    Chapter, Column, ControllerError, Request, RequestId, Response, Subject, SyncController,
};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Errors shared by the study data commands.
#[derive(Debug)]
pub enum CommandError {
    NotFound { kind: &'static str, query: String },
    Ambiguous { kind: &'static str, query: String },
    NoActiveSubject,
    /// Already shown to the user through the controller's notice.
    Reported,
    Controller(ControllerError),
    Io(io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotFound { kind, query } => write!(f, "{} not found: {}", kind, query),
            CommandError::Ambiguous { kind, query } => {
                write!(f, "More than one {} named '{}'. Use the id instead.", kind, query)
            }
            CommandError::NoActiveSubject => {
                write!(f, "No subjects yet. Add one with 'prepmap subject add'.")
            }
            CommandError::Reported => write!(f, "Command failed"),
            CommandError::Controller(e) => write!(f, "{}", e),
            CommandError::Io(e) => write!(f, "I/O error: {}", e),
            CommandError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ControllerError> for CommandError {
    fn from(e: ControllerError) -> Self {
        CommandError::Controller(e)
    }
}

impl From<io::Error> for CommandError {
    fn from(e: io::Error) -> Self {
        CommandError::Io(e)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Json(e)
    }
}

/// True if `error` was already shown as a notice and must not be printed again.
pub fn already_reported(error: &(dyn std::error::Error + 'static)) -> bool {
    matches!(
        error.downcast_ref::<CommandError>(),
        Some(CommandError::Reported)
    )
}

/// Finds an item by exact id, falling back to a case-insensitive name.
fn find_by<'a, T>(
    items: &'a [T],
    query: &str,
    kind: &'static str,
    id_and_name: impl Fn(&T) -> (&str, &str),
) -> Result<&'a T, CommandError> {
    if let Some(item) = items.iter().find(|item| id_and_name(item).0 == query) {
        return Ok(item);
    }

    let mut matches = items
        .iter()
        .filter(|item| id_and_name(item).1.eq_ignore_ascii_case(query.trim()));
    match (matches.next(), matches.next()) {
        (Some(item), None) => Ok(item),
        (Some(_), Some(_)) => Err(CommandError::Ambiguous {
            kind,
            query: query.to_string(),
        }),
        (None, _) => Err(CommandError::NotFound {
            kind,
            query: query.to_string(),
        }),
    }
}

pub(crate) fn find_subject<'a>(
    controller: &'a SyncController,
    query: &str,
) -> Result<&'a Subject, CommandError> {
    find_by(controller.subjects(), query, "Subject", |s| (s.id.as_str(), s.name.as_str()))
}

pub(crate) fn find_chapter<'a>(subject: &'a Subject, query: &str) -> Result<&'a Chapter, CommandError> {
    find_by(&subject.chapters, query, "Chapter", |c| (c.id.as_str(), c.name.as_str()))
}

pub(crate) fn find_column<'a>(
    controller: &'a SyncController,
    query: &str,
) -> Result<&'a Column, CommandError> {
    find_by(controller.columns(), query, "Column", |c| (c.id.as_str(), c.name.as_str()))
}

/// Answers a queued prompt with `text`. Returns the created id, if any.
pub(crate) fn answer_prompt(
    controller: &mut SyncController,
    id: RequestId,
    text: &str,
) -> Result<Option<String>, CommandError> {
    Ok(controller.resolve(id, Response::Text(text.to_string()))?)
}

/// Answers a queued confirmation, asking on stdin unless `force` is set.
///
/// Returns true if the action was carried out.
pub(crate) fn answer_confirm(
    controller: &mut SyncController,
    id: RequestId,
    target: &str,
    force: bool,
) -> Result<bool, CommandError> {
    let response = if force {
        Response::Confirmed
    } else {
        let question = controller
            .pending_requests()
            .find(|r| r.id() == id)
            .map(|r| match r {
                Request::Confirm { title, message, .. } => {
                    format!("{} '{}'? {}", title, target, message)
                }
                Request::Prompt { title, .. } => title.clone(),
            })
            .unwrap_or_default();

        print!("{} [y/N] ", question);
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if input.trim().eq_ignore_ascii_case("y") {
            Response::Confirmed
        } else {
            Response::Cancelled
        }
    };

    let confirmed = response == Response::Confirmed;
    controller.resolve(id, response)?;
    if !confirmed {
        println!("Cancelled.");
    }
    Ok(confirmed)
}
