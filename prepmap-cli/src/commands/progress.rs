//! Read-only progress views and the progress toggle.

use clap::Args;
use prepmap_core::{Mode, Subject, SyncController};

use super::{find_chapter, find_column, find_subject, CommandError};

/// Show sync mode and completion per subject
#[derive(Args)]
pub struct StatusCommand;

impl StatusCommand {
    pub fn run(&self, controller: &SyncController) -> Result<(), CommandError> {
        print_summary(controller);
        Ok(())
    }
}

/// Prints mode, overall completion and one line per subject.
pub fn print_summary(controller: &SyncController) {
    match controller.mode() {
        Mode::Remote(session) => println!("Mode: cloud (user {})", session.user_id),
        Mode::Local => println!("Mode: local"),
        Mode::Unresolved => println!("Mode: starting"),
    }

    let overall = controller.overall_completion();
    println!(
        "Overall: {}% ({}/{})",
        overall.percent(),
        overall.done,
        overall.total
    );

    if controller.subjects().is_empty() {
        println!("\nNo subjects yet. Add one with 'prepmap subject add <NAME>'.");
        return;
    }

    println!();
    let width = controller
        .subjects()
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0);
    let active = controller.active_subject().map(|s| s.id.as_str());
    for subject in controller.subjects() {
        let completion = controller
            .subject_completion(&subject.id)
            .unwrap_or_default();
        let marker = if active == Some(subject.id.as_str()) { "*" } else { " " };
        println!(
            "{} {:<width$}  {:>3}% ({}/{})",
            marker,
            subject.name,
            completion.percent(),
            completion.done,
            completion.total,
            width = width
        );
    }
}

/// Show the chapter x column matrix of a subject
#[derive(Args)]
pub struct ShowCommand {
    /// Subject ID or name (defaults to the first subject)
    pub subject: Option<String>,
}

impl ShowCommand {
    pub fn run(&self, controller: &SyncController) -> Result<(), CommandError> {
        let subject = match &self.subject {
            Some(query) => find_subject(controller, query)?,
            None => controller
                .active_subject()
                .ok_or(CommandError::NoActiveSubject)?,
        };
        print!("{}", render_matrix(controller, subject));
        Ok(())
    }
}

fn render_matrix(controller: &SyncController, subject: &Subject) -> String {
    let completion = controller
        .subject_completion(&subject.id)
        .unwrap_or_default();
    let mut out = format!(
        "{} ({}) - {}%\n\n",
        subject.name,
        subject.id,
        completion.percent()
    );

    if subject.chapters.is_empty() {
        out.push_str("No chapters yet.\n");
        return out;
    }

    let columns = controller.columns();
    let name_width = subject
        .chapters
        .iter()
        .map(|c| c.name.chars().count())
        .chain(std::iter::once("Chapter".len()))
        .max()
        .unwrap_or(0);

    out.push_str(&format!("{:<w$}", "Chapter", w = name_width));
    for column in columns {
        out.push_str(&format!("  {}", column.name));
    }
    out.push('\n');

    for chapter in &subject.chapters {
        out.push_str(&format!("{:<w$}", chapter.name, w = name_width));
        for column in columns {
            let mark = if chapter.is_done(&column.id) { "[x]" } else { "[ ]" };
            let cell_width = column.name.chars().count().max(3);
            out.push_str(&format!("  {:<w$}", mark, w = cell_width));
        }
        out.push('\n');
    }
    out
}

/// Toggle one chapter/column cell
#[derive(Args)]
pub struct ToggleCommand {
    /// Subject ID or name
    pub subject: String,

    /// Chapter ID or name
    pub chapter: String,

    /// Column ID or name
    pub column: String,
}

impl ToggleCommand {
    pub fn run(&self, controller: &mut SyncController) -> Result<(), CommandError> {
        let (subject_id, chapter_id, chapter_name, column_id, column_name) = {
            let subject = find_subject(controller, &self.subject)?;
            let chapter = find_chapter(subject, &self.chapter)?;
            let column = find_column(controller, &self.column)?;
            (
                subject.id.clone(),
                chapter.id.clone(),
                chapter.name.clone(),
                column.id.clone(),
                column.name.clone(),
            )
        };

        controller.toggle_progress(&subject_id, &chapter_id, &column_id)?;

        let done = controller
            .document()
            .subject(&subject_id)
            .and_then(|s| s.chapter(&chapter_id))
            .map(|c| c.is_done(&column_id))
            .unwrap_or(false);
        let percent = controller
            .subject_completion(&subject_id)
            .unwrap_or_default()
            .percent();
        println!(
            "{} / {}: {} (subject {}%)",
            chapter_name,
            column_name,
            if done { "done" } else { "not done" },
            percent
        );
        Ok(())
    }
}
