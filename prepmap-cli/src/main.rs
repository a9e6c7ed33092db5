use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;

use app::App;
use commands::{
    already_reported, print_summary, AuthCommand, ChapterCommand, ColumnCommand, ConfigCommand,
    ExportCommand, ImportCommand, ShowCommand, StatusCommand, SubjectCommand, ToggleCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "prepmap")]
#[command(version)]
#[command(about = "Track chapter-by-chapter study progress", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync mode and overall progress
    Status(StatusCommand),

    /// Show the chapter x column matrix of a subject
    Show(ShowCommand),

    /// Manage subjects
    Subject(SubjectCommand),

    /// Manage chapters of a subject
    Chapter(ChapterCommand),

    /// Manage progress columns
    Column(ColumnCommand),

    /// Toggle a chapter's progress in one column
    Toggle(ToggleCommand),

    /// Export a JSON backup
    Export(ExportCommand),

    /// Import a JSON backup, replacing all data
    Import(ImportCommand),

    /// Print progress whenever the cloud copy changes (Ctrl-C to stop)
    Watch,

    /// Log in to or out of the document server
    Auth(AuthCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PREPMAP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        if !already_reported(&*e) {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Auth(cmd)) => return Ok(cmd.run(&config)?),
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let mut app = App::start(&config)?;
    let result = execute_command(&command, &mut app);
    app.finish();
    result
}

fn execute_command(command: &Commands, app: &mut App) -> Result<(), Box<dyn std::error::Error>> {
    let controller = app.controller();
    match command {
        Commands::Status(cmd) => cmd.run(controller)?,
        Commands::Show(cmd) => cmd.run(controller)?,
        Commands::Subject(cmd) => cmd.run(controller)?,
        Commands::Chapter(cmd) => cmd.run(controller)?,
        Commands::Column(cmd) => cmd.run(controller)?,
        Commands::Toggle(cmd) => cmd.run(controller)?,
        Commands::Export(cmd) => cmd.run(controller)?,
        Commands::Import(cmd) => cmd.run(controller)?,
        Commands::Watch => {
            print_summary(controller);
            app.watch(|controller| {
                println!();
                print_summary(controller);
                if let Some(notice) = controller.notice() {
                    eprintln!("Notice: {}", notice);
                }
            });
        }
        Commands::Auth(_) | Commands::Config(_) => {}
    }
    Ok(())
}
