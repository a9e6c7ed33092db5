use clap::{Args, Subcommand};
use prepmap_core::SyncController;

use super::{answer_confirm, answer_prompt, find_subject, CommandError, OutputFormat};

#[derive(Args)]
pub struct SubjectCommand {
    #[command(subcommand)]
    pub command: SubjectSubcommand,
}

#[derive(Subcommand)]
pub enum SubjectSubcommand {
    /// Add a subject
    Add {
        /// Subject name
        name: String,
    },

    /// Rename a subject
    Rename {
        /// Subject ID or name
        subject: String,

        /// New name
        name: String,
    },

    /// Delete a subject and all of its chapters
    Delete {
        /// Subject ID or name
        subject: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// List subjects with their completion
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl SubjectCommand {
    pub fn run(&self, controller: &mut SyncController) -> Result<(), CommandError> {
        match &self.command {
            SubjectSubcommand::Add { name } => {
                let request = controller.request_add_subject();
                match answer_prompt(controller, request, name)? {
                    Some(id) => println!("Added subject: {} ({})", name.trim(), id),
                    None => println!("Subject name is empty, nothing added."),
                }
                Ok(())
            }

            SubjectSubcommand::Rename { subject, name } => {
                let (id, old_name) = {
                    let found = find_subject(controller, subject)?;
                    (found.id.clone(), found.name.clone())
                };
                let request = controller.request_rename_subject(&id)?;
                answer_prompt(controller, request, name)?;
                if name.trim().is_empty() {
                    println!("New name is empty, subject unchanged.");
                } else {
                    println!("Renamed subject: {} -> {}", old_name, name.trim());
                }
                Ok(())
            }

            SubjectSubcommand::Delete { subject, force } => {
                let (id, name, chapters) = {
                    let found = find_subject(controller, subject)?;
                    (found.id.clone(), found.name.clone(), found.chapters.len())
                };
                let request = controller.request_delete_subject(&id)?;
                if answer_confirm(controller, request, &name, *force)? {
                    println!("Deleted subject: {} ({} chapters)", name, chapters);
                }
                Ok(())
            }

            SubjectSubcommand::List { format } => {
                let active = controller.active_subject().map(|s| s.id.clone());
                match format {
                    OutputFormat::Json => {
                        let rows: Vec<_> = controller
                            .subjects()
                            .iter()
                            .map(|s| {
                                let completion =
                                    controller.subject_completion(&s.id).unwrap_or_default();
                                serde_json::json!({
                                    "id": s.id,
                                    "name": s.name,
                                    "chapters": s.chapters.len(),
                                    "done": completion.done,
                                    "total": completion.total,
                                    "percent": completion.percent(),
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        if controller.subjects().is_empty() {
                            println!("No subjects yet.");
                            return Ok(());
                        }
                        for s in controller.subjects() {
                            let completion =
                                controller.subject_completion(&s.id).unwrap_or_default();
                            let marker = if active.as_deref() == Some(s.id.as_str()) {
                                "*"
                            } else {
                                " "
                            };
                            println!(
                                "{} {} ({})  {} chapters  {}%",
                                marker,
                                s.name,
                                s.id,
                                s.chapters.len(),
                                completion.percent()
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
