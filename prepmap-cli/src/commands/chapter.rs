use clap::{Args, Subcommand};
use prepmap_core::SyncController;

use super::{answer_confirm, answer_prompt, find_chapter, find_subject, CommandError};

#[derive(Args)]
pub struct ChapterCommand {
    #[command(subcommand)]
    pub command: ChapterSubcommand,
}

#[derive(Subcommand)]
pub enum ChapterSubcommand {
    /// Add a chapter to a subject
    Add {
        /// Subject ID or name
        subject: String,

        /// Chapter name
        name: String,
    },

    /// Rename a chapter
    Rename {
        /// Subject ID or name
        subject: String,

        /// Chapter ID or name
        chapter: String,

        /// New name
        name: String,
    },

    /// Delete a chapter and its progress
    Delete {
        /// Subject ID or name
        subject: String,

        /// Chapter ID or name
        chapter: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl ChapterCommand {
    pub fn run(&self, controller: &mut SyncController) -> Result<(), CommandError> {
        match &self.command {
            ChapterSubcommand::Add { subject, name } => {
                let (subject_id, subject_name) = {
                    let found = find_subject(controller, subject)?;
                    (found.id.clone(), found.name.clone())
                };
                let request = controller.request_add_chapter(&subject_id)?;
                match answer_prompt(controller, request, name)? {
                    Some(id) => println!("Added chapter to {}: {} ({})", subject_name, name.trim(), id),
                    None => println!("Chapter name is empty, nothing added."),
                }
                Ok(())
            }

            ChapterSubcommand::Rename {
                subject,
                chapter,
                name,
            } => {
                let (subject_id, chapter_id, old_name) = {
                    let found = find_subject(controller, subject)?;
                    let ch = find_chapter(found, chapter)?;
                    (found.id.clone(), ch.id.clone(), ch.name.clone())
                };
                let request = controller.request_rename_chapter(&subject_id, &chapter_id)?;
                answer_prompt(controller, request, name)?;
                if name.trim().is_empty() {
                    println!("New name is empty, chapter unchanged.");
                } else {
                    println!("Renamed chapter: {} -> {}", old_name, name.trim());
                }
                Ok(())
            }

            ChapterSubcommand::Delete {
                subject,
                chapter,
                force,
            } => {
                let (subject_id, chapter_id, name) = {
                    let found = find_subject(controller, subject)?;
                    let ch = find_chapter(found, chapter)?;
                    (found.id.clone(), ch.id.clone(), ch.name.clone())
                };
                let request = controller.request_delete_chapter(&subject_id, &chapter_id)?;
                if answer_confirm(controller, request, &name, *force)? {
                    println!("Deleted chapter: {}", name);
                }
                Ok(())
            }
        }
    }
}
