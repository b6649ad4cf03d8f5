use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{
    paths::ProjectPaths,
    runtime_config::{AccelDefaults, LoggingConfig, RuntimeConfig, StorageConfig},
};

#[derive(Debug)]
pub enum ConfigLoadError {
    NotFound,
    ParseError(String),
    IoError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::NotFound => write!(f, "Config file not found"),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigLoadError::IoError(msg) => write!(f, "IO error reading config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Accelerometer sampling defaults
    #[serde(default)]
    pub accel: AccelDefaults,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TetherConfig {
    pub fn config_path() -> PathBuf {
        ProjectPaths::new("tether")
            .map(|p| p.config_file())
            .unwrap_or_else(|| PathBuf::from("tether.toml"))
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigLoadError> {
        toml::from_str(content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::runtime_config::DEFAULT_SETTINGS_URL;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TetherConfig::parse("").unwrap();
        assert_eq!(config.runtime.settings_url, DEFAULT_SETTINGS_URL);
        assert!(config.runtime.main_script_url.is_none());
        assert_eq!(config.accel.rate, 100);
        assert_eq!(config.accel.samples, 25);
        assert!(!config.logging.file);
    }

    #[test]
    fn test_partial_sections() {
        let config = TetherConfig::parse(
            r#"
            [runtime]
            main_script_url = "example.com/app.js"

            [accel]
            rate = 50
            "#,
        )
        .unwrap();
        assert_eq!(
            config.runtime.main_script_url.as_deref(),
            Some("example.com/app.js")
        );
        assert_eq!(config.accel.rate, 50);
        assert_eq!(config.accel.samples, 25);
    }

    #[test]
    fn test_parse_error() {
        let result = TetherConfig::parse("[runtime\nfoo = ");
        assert!(matches!(result, Err(ConfigLoadError::ParseError(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(matches!(
            TetherConfig::load_from(&path),
            Err(ConfigLoadError::NotFound)
        ));

        let mut config = TetherConfig::default();
        config.storage.path = Some(dir.path().join("store.json"));
        config.save_to(&path).unwrap();

        let loaded = TetherConfig::load_from(&path).unwrap();
        assert_eq!(loaded.storage.path(), dir.path().join("store.json"));
    }
}
