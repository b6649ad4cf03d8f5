pub mod paths;
pub mod runtime_config;
pub mod tether_config;

pub use paths::ProjectPaths;
pub use runtime_config::{AccelDefaults, LoggingConfig, RuntimeConfig, StorageConfig};
pub use tether_config::{ConfigLoadError, TetherConfig};
