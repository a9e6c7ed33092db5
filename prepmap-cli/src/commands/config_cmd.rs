use clap::{Args, Subcommand};

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        let mut value = serde_json::to_value(config)?;
                        if let Some(key) = value.pointer_mut("/sync/api_key") {
                            if !key.is_null() {
                                *key = serde_json::Value::String("****".to_string());
                            }
                        }
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        println!("default_columns: {}", config.default_columns.value.join(", "));
                        println!("  source: {}", config.default_columns.source);
                        println!();

                        println!(
                            "sync.server_url: {}",
                            config.sync.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "sync.api_key: {}",
                            if config.sync.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
