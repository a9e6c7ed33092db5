//! Server configuration.
//!
//! Environment variables:
//! - `PREPMAP_PORT`: Port to listen on (default: 8080)
//! - `PREPMAP_DATA_DIR`: Directory to store documents (default: ~/.local/share/prepmap-server)
//! - `PREPMAP_CONFIG`: Path to config file (default: ~/.config/prepmap-server/config.yaml)
//!
//! Config file format:
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use serde::Deserialize;
use std::path::PathBuf;

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Directory holding one JSON document per user
    pub data_dir: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PREPMAP_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = lookup("PREPMAP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("prepmap-server")
            });

        let config_path = lookup("PREPMAP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("prepmap-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}
