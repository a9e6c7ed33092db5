//! Authentication commands for the PrepMap CLI.
//!
//! Logging in stores an API key for the document server; from then on every
//! command works on the cloud copy of the study data.

use crate::app::{remote_client, App, AppError};
use crate::config::Config;
use clap::{Args, Subcommand};
use prepmap_core::{check_server, SessionError};
use std::io::{self, Write};
use std::path::Path;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Log in with an API key issued by the document server
    Login {
        /// API key (prompted for if omitted)
        #[arg(long)]
        api_key: Option<String>,

        /// Server URL, saved to config (defaults to sync.server_url)
        #[arg(long)]
        server: Option<String>,
    },
    /// Log out (remove API key from config)
    Logout,
    /// Show authentication status
    Status,
}

impl AuthCommand {
    pub fn run(&self, config: &Config) -> Result<(), AuthError> {
        match &self.command {
            AuthSubcommand::Login { api_key, server } => {
                login(config, api_key.as_deref(), server.as_deref())
            }
            AuthSubcommand::Logout => logout(config),
            AuthSubcommand::Status => status(config),
        }
    }
}

/// Errors that can occur during authentication
#[derive(Debug)]
pub enum AuthError {
    /// I/O error
    IoError(io::Error),
    /// Identity could not be resolved
    SessionError(SessionError),
    /// Config file error
    ConfigError(String),
    /// Controller failed to start
    AppError(AppError),
    /// Server not configured
    NotConfigured,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::IoError(e) => write!(f, "I/O error: {}", e),
            AuthError::SessionError(e) => write!(f, "{}", e),
            AuthError::ConfigError(e) => write!(f, "Config error: {}", e),
            AuthError::AppError(e) => write!(f, "{}", e),
            AuthError::NotConfigured => {
                write!(
                    f,
                    "Sync server not configured. Pass --server or set sync.server_url in config."
                )
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<io::Error> for AuthError {
    fn from(e: io::Error) -> Self {
        AuthError::IoError(e)
    }
}

impl From<AppError> for AuthError {
    fn from(e: AppError) -> Self {
        AuthError::AppError(e)
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, AuthError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AuthError::ConfigError(format!("Failed to create runtime: {}", e)))
}

/// Verifies the key against `/me`, saves it, then opens the cloud document.
fn login(config: &Config, api_key: Option<&str>, server: Option<&str>) -> Result<(), AuthError> {
    let server_url = server
        .map(str::to_string)
        .or_else(|| config.sync.server_url.clone())
        .ok_or(AuthError::NotConfigured)?;

    let api_key = match api_key {
        Some(key) => key.trim().to_string(),
        None => {
            print!("Enter API key: ");
            io::stdout().flush()?;
            let mut key = String::new();
            io::stdin().read_line(&mut key)?;
            key.trim().to_string()
        }
    };
    if api_key.is_empty() {
        return Err(AuthError::IoError(io::Error::new(
            io::ErrorKind::InvalidInput,
            "API key cannot be empty",
        )));
    }

    let client = prepmap_core::RemoteClient::new(server_url.clone(), api_key.clone());
    let session = runtime()?
        .block_on(client.fetch_identity())
        .map_err(AuthError::SessionError)?;

    let config_path = config.writable_path();
    save_sync_settings(&config_path, server.map(|_| server_url.as_str()), &api_key)?;
    println!("Authenticated as {}", session.user_id);

    // Load local data first so an account without a cloud document is
    // seeded from it.
    let mut signed_in = config.clone();
    signed_in.sync.server_url = Some(server_url);
    signed_in.sync.api_key = Some(api_key);
    let mut app = App::start_signed_out(&signed_in)?;
    if app.sign_in()? {
        println!(
            "Cloud data: {} subjects, {}% complete",
            app.controller().subjects().len(),
            app.controller().overall_completion().percent()
        );
    }
    app.finish();
    Ok(())
}

/// Save API key (and optionally server URL) to config file
fn save_sync_settings(
    config_path: &Path,
    server_url: Option<&str>,
    api_key: &str,
) -> Result<(), AuthError> {
    // Read existing config or create new
    let mut config: serde_yaml::Value = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| AuthError::ConfigError(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| AuthError::ConfigError(e.to_string()))?
    } else {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    };
    if config.is_null() {
        config = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    }

    let mapping = config
        .as_mapping_mut()
        .ok_or_else(|| AuthError::ConfigError("Invalid config format".to_string()))?;

    let sync_key = serde_yaml::Value::String("sync".to_string());
    if !mapping.contains_key(&sync_key) {
        mapping.insert(
            sync_key.clone(),
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        );
    }

    if let Some(sync_mapping) = mapping.get_mut(&sync_key).and_then(|s| s.as_mapping_mut()) {
        sync_mapping.insert(
            serde_yaml::Value::String("api_key".to_string()),
            serde_yaml::Value::String(api_key.to_string()),
        );
        if let Some(url) = server_url {
            sync_mapping.insert(
                serde_yaml::Value::String("server_url".to_string()),
                serde_yaml::Value::String(url.to_string()),
            );
        }
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    }

    let yaml = serde_yaml::to_string(&config).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    std::fs::write(config_path, yaml).map_err(|e| AuthError::ConfigError(e.to_string()))?;

    Ok(())
}

/// Remove API key from config file
fn remove_api_key(config_path: &Path) -> Result<bool, AuthError> {
    if !config_path.exists() {
        return Ok(false);
    }

    let contents =
        std::fs::read_to_string(config_path).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    let mut yaml: serde_yaml::Value =
        serde_yaml::from_str(&contents).map_err(|e| AuthError::ConfigError(e.to_string()))?;

    let mut removed = false;
    if let Some(mapping) = yaml.as_mapping_mut() {
        let sync_key = serde_yaml::Value::String("sync".to_string());
        if let Some(sync_mapping) = mapping.get_mut(&sync_key).and_then(|s| s.as_mapping_mut()) {
            removed = sync_mapping
                .remove(serde_yaml::Value::String("api_key".to_string()))
                .is_some();
        }
    }

    let yaml_str =
        serde_yaml::to_string(&yaml).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    std::fs::write(config_path, yaml_str).map_err(|e| AuthError::ConfigError(e.to_string()))?;
    Ok(removed)
}

/// Signs the controller out, then drops the key from config.
fn logout(config: &Config) -> Result<(), AuthError> {
    if config.sync.is_configured() {
        let mut app = App::start(config)?;
        app.controller().sign_out();
        app.settle();
        println!(
            "Now using local data: {} subjects",
            app.controller().subjects().len()
        );
        app.finish();
    }

    if remove_api_key(&config.writable_path())? {
        println!("Logged out. Sync disabled until you log in again.");
    } else {
        println!("Already logged out.");
    }
    Ok(())
}

/// Show authentication status
fn status(config: &Config) -> Result<(), AuthError> {
    let (Some(server_url), Some(key)) = (&config.sync.server_url, &config.sync.api_key) else {
        if config.sync.server_url.is_some() {
            println!("Not logged in. Run 'prepmap auth login' to authenticate.");
        } else {
            println!("Not configured. Run 'prepmap auth login --server <URL>' first.");
        }
        return Ok(());
    };

    println!("Server: {}", server_url);
    println!("API key: {}", mask_key(key));

    let rt = runtime()?;
    if !rt.block_on(check_server(server_url)) {
        println!("Status: server unreachable");
        return Ok(());
    }
    match remote_client(&config.sync) {
        Some(client) => match rt.block_on(client.fetch_identity()) {
            Ok(session) => println!("Status: logged in as {}", session.user_id),
            Err(e) => println!("Status: {}", e),
        },
        None => println!("Status: not logged in"),
    }
    Ok(())
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}
