use clap::{Args, Subcommand};
use prepmap_core::SyncController;

use super::{answer_confirm, answer_prompt, find_column, CommandError, OutputFormat};

#[derive(Args)]
pub struct ColumnCommand {
    #[command(subcommand)]
    pub command: ColumnSubcommand,
}

#[derive(Subcommand)]
pub enum ColumnSubcommand {
    /// Add a progress column (e.g. "Mock Test")
    Add {
        /// Column name
        name: String,
    },

    /// Delete a column. Progress recorded under it is kept but no longer counted.
    Delete {
        /// Column ID or name
        column: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// List columns
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ColumnCommand {
    pub fn run(&self, controller: &mut SyncController) -> Result<(), CommandError> {
        match &self.command {
            ColumnSubcommand::Add { name } => {
                let request = controller.request_add_column();
                match answer_prompt(controller, request, name)? {
                    Some(id) => println!("Added column: {} ({})", name.trim(), id),
                    None => println!("Column name is empty, nothing added."),
                }
                Ok(())
            }

            ColumnSubcommand::Delete { column, force } => {
                let (id, name) = {
                    let found = find_column(controller, column)?;
                    (found.id.clone(), found.name.clone())
                };
                let request = controller.request_delete_column(&id)?;
                if answer_confirm(controller, request, &name, *force)? {
                    println!("Deleted column: {}", name);
                }
                Ok(())
            }

            ColumnSubcommand::List { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(controller.columns())?);
                    }
                    OutputFormat::Text => {
                        if controller.columns().is_empty() {
                            println!("No columns.");
                        }
                        for column in controller.columns() {
                            println!("{}", column);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
