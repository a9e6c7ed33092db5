use prepmap_core::Column;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// Document server URL (e.g., "http://localhost:8080")
    pub server_url: Option<String>,
    /// API key for authentication
    pub api_key: Option<String>,
}

impl SyncConfig {
    /// Returns true if sync is configured (has both server_url and api_key)
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local cache
    pub data_dir: ConfigValue<PathBuf>,
    /// Column names of a fresh document
    pub default_columns: ConfigValue<Vec<String>>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    default_columns: Option<Vec<String>>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut default_columns = ConfigValue::new(
            vec!["Notes".to_string(), "Revision 1".to_string()],
            ConfigSource::Default,
        );
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(columns) = file_config.default_columns {
                default_columns = ConfigValue::new(columns, ConfigSource::File);
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        if let Ok(dir) = std::env::var("PREPMAP_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("PREPMAP_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("PREPMAP_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }

        Ok(Self {
            data_dir,
            default_columns,
            config_file,
            sync,
        })
    }

    /// Columns for a fresh document, with ids `c1`, `c2`, ...
    pub fn columns(&self) -> Vec<Column> {
        self.default_columns
            .value
            .iter()
            .enumerate()
            .map(|(i, name)| Column::new(format!("c{}", i + 1), name.clone()))
            .collect()
    }

    /// Path that `auth login` and `auth logout` edit.
    pub fn writable_path(&self) -> PathBuf {
        self.config_file
            .clone()
            .unwrap_or_else(Self::default_config_path)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/prepmap/
    /// - macOS: ~/Library/Application Support/prepmap/
    /// - Windows: %APPDATA%/prepmap/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prepmap")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/prepmap/
    /// - macOS: ~/Library/Application Support/prepmap/
    /// - Windows: %APPDATA%/prepmap/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prepmap")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.ends_with("prepmap"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.default_columns.value, vec!["Notes", "Revision 1"]);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: /custom/prepmap").unwrap();
        writeln!(file, "default_columns: [Notes, Mock, PYQ]").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  server_url: http://localhost:8080").unwrap();
        writeln!(file, "  api_key: secret").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/custom/prepmap"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.default_columns.source, ConfigSource::File);
        assert!(config.sync.is_configured());
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_data_dir_resolves_against_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "data_dir: data\n").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("data"));
    }

    #[test]
    fn test_columns_get_sequential_ids() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "default_columns: [Notes, Mock]\n").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.columns(),
            vec![Column::new("c1", "Notes"), Column::new("c2", "Mock")]
        );
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "data_dir: /from/file\n").unwrap();

        std::env::set_var("PREPMAP_DATA_DIR", "/from/env");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/from/env"));
        assert_eq!(config.data_dir.source, ConfigSource::Environment);

        std::env::remove_var("PREPMAP_DATA_DIR");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
