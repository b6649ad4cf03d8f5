use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::paths::ProjectPaths;
use crate::accel::{DEFAULT_RATE, DEFAULT_SAMPLES};

/// Settings page used when a script registers no listener of its own
pub const DEFAULT_SETTINGS_URL: &str = "http://meiguro.com/simplyjs/settings.html";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Main script to load when none is given on the command line
    #[serde(default)]
    pub main_script_url: Option<String>,

    /// Settings page opened for scripts without a settings listener
    #[serde(default = "default_settings_url")]
    pub settings_url: String,
}

fn default_settings_url() -> String {
    DEFAULT_SETTINGS_URL.to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            main_script_url: None,
            settings_url: default_settings_url(),
        }
    }
}

/// Sampling parameters sent with the first subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelDefaults {
    /// Sampling rate in Hz (default: 100)
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Samples per batch (default: 25)
    #[serde(default = "default_samples")]
    pub samples: u32,
}

fn default_rate() -> u32 {
    DEFAULT_RATE
}

fn default_samples() -> u32 {
    DEFAULT_SAMPLES
}

impl Default for AccelDefaults {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            samples: DEFAULT_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store file (default: ~/.local/share/tether/store.json)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            ProjectPaths::new("tether")
                .map(|p| p.store_file())
                .unwrap_or_else(|| PathBuf::from(".tether-store.json"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to ~/.local/share/tether/logs
    #[serde(default)]
    pub file: bool,
}
