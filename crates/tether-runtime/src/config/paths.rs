use std::env;
use std::path::PathBuf;

/// Directory layout for one application name.
///
/// Unix-like systems follow the XDG base directories:
/// - Config: $XDG_CONFIG_HOME/{name} (default: ~/.config/{name})
/// - Data: $XDG_DATA_HOME/{name} (default: ~/.local/share/{name})
/// - Cache: $XDG_CACHE_HOME/{name} (default: ~/.cache/{name})
///
/// Windows uses %APPDATA% for config and data, %LOCALAPPDATA% for cache.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    name: String,
}

impl ProjectPaths {
    /// `None` when no home directory can be determined
    pub fn new(name: &str) -> Option<Self> {
        home_dir()?;
        Some(ProjectPaths {
            name: name.to_string(),
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            self.windows_dir("APPDATA")
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_CONFIG_HOME", &[".config"]).join(&self.name)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            self.windows_dir("APPDATA")
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_DATA_HOME", &[".local", "share"]).join(&self.name)
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            self.windows_dir("LOCALAPPDATA")
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_CACHE_HOME", &[".cache"]).join(&self.name)
        }
    }

    /// `<config_dir>/config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// `<data_dir>/store.json`, the default persistent store
    pub fn store_file(&self) -> PathBuf {
        self.data_dir().join("store.json")
    }

    /// `<data_dir>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    #[cfg(target_os = "windows")]
    fn windows_dir(&self, var: &str) -> PathBuf {
        env::var(var)
            .ok()
            .map(|p| PathBuf::from(p).join(&self.name))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", self.name)))
    }
}

/// HOME, falling back to USERPROFILE
fn home_dir() -> Option<PathBuf> {
    env::var("HOME")
        .ok()
        .or_else(|| env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

/// `$var` if set, otherwise `~/<fallback...>`, otherwise the relative fallback
#[cfg(not(target_os = "windows"))]
fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    let relative: PathBuf = fallback.iter().collect();
    env::var(var)
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(&relative)))
        .unwrap_or(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_end_with_name() {
        if let Some(paths) = ProjectPaths::new("tether") {
            assert!(paths.config_dir().ends_with("tether"));
            assert!(paths.data_dir().ends_with("tether"));
            assert!(paths.cache_dir().ends_with("tether"));
        }
    }

    #[test]
    fn test_well_known_files() {
        if let Some(paths) = ProjectPaths::new("tether") {
            assert_eq!(paths.config_file().file_name().unwrap(), "config.toml");
            assert_eq!(paths.store_file().file_name().unwrap(), "store.json");
            assert!(paths.log_dir().starts_with(paths.data_dir()));
        }
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_xdg_fallback_is_under_home_or_relative() {
        let dir = xdg_dir("TETHER_TEST_UNSET_XDG_VAR", &[".local", "share"]);
        assert!(dir.ends_with(".local/share"));
    }
}
