use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::Args;
use prepmap_core::{ControllerError, SyncController};

use super::CommandError;

/// Export all study data as a JSON backup
#[derive(Args)]
pub struct ExportCommand {
    /// Output file ("-" for stdout). Defaults to prepmap_backup_<date>.json
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl ExportCommand {
    pub fn run(&self, controller: &SyncController) -> Result<(), CommandError> {
        let backup = controller.export_backup(backup_date(Local::now()));

        let path = match &self.output {
            Some(path) if path.as_os_str() == "-" => {
                println!("{}", backup.contents);
                return Ok(());
            }
            Some(path) => path.clone(),
            None => PathBuf::from(&backup.file_name),
        };

        fs::write(&path, &backup.contents)?;
        println!("Exported backup to {}", path.display());
        Ok(())
    }
}

/// Backups are dated by the UTC calendar day, whatever the local zone.
fn backup_date<Tz: TimeZone>(now: DateTime<Tz>) -> NaiveDate {
    now.with_timezone(&Utc).date_naive()
}

/// Replace all study data with a JSON backup
#[derive(Args)]
pub struct ImportCommand {
    /// Backup file to import
    pub file: PathBuf,
}

impl ImportCommand {
    pub fn run(&self, controller: &mut SyncController) -> Result<(), CommandError> {
        let text = fs::read_to_string(&self.file)?;
        match controller.import_backup(&text) {
            Ok(()) => {}
            // The controller has raised an "invalid backup" notice
            Err(ControllerError::Import(_)) => return Err(CommandError::Reported),
            Err(e) => return Err(e.into()),
        }
        println!(
            "Imported {} subjects and {} columns from {}",
            controller.subjects().len(),
            controller.columns().len(),
            self.file.display()
        );
        Ok(())
    }
}
