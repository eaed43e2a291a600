//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. Selection
//! parameters given there override the database `settings` table; command-line
//! arguments override both.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "SMP_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "smartplayer.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path; defaults to `<root_folder>/smartplayer.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Selection parameter overrides (optional)
    #[serde(default)]
    pub selection: SelectionOverrides,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Selection parameters that may be pinned in the TOML file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SelectionOverrides {
    pub recency_window_secs: Option<u64>,
    pub near_duplicate_threshold: Option<f64>,
    pub shortlist_size: Option<usize>,
    pub title_match: Option<String>,
}

impl TomlConfig {
    /// Load and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parse TOML configuration text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load the platform default config file, if one exists
    ///
    /// A missing file is not an error; a present but malformed file is.
    pub fn load_default() -> Result<Option<Self>> {
        match default_config_path() {
            Some(path) => {
                debug!("Loading config file {}", path.display());
                Self::load(&path).map(Some)
            }
            None => {
                debug!("No config file found, using defaults");
                Ok(None)
            }
        }
    }
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root_folder) = toml_config.and_then(|c| c.root_folder.as_ref()) {
        return root_folder.clone();
    }

    default_root_folder()
}

/// Database path: command-line argument, then TOML `database_path`, then
/// `<root_folder>/smartplayer.db`
pub fn resolve_database_path(
    cli_arg: Option<&Path>,
    toml_config: Option<&TomlConfig>,
    root_folder: &Path,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = toml_config.and_then(|c| c.database_path.as_ref()) {
        return path.clone();
    }

    root_folder.join(DATABASE_FILE_NAME)
}

/// Get default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("smartplayer").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/smartplayer/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("smartplayer"),
        None => {
            warn!("Could not determine local data directory, using ./smartplayer_data");
            PathBuf::from("./smartplayer_data")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::parse(
            r#"
            root_folder = "/srv/music"
            database_path = "/srv/music/db/resolver.db"

            [logging]
            level = "debug"

            [selection]
            recency_window_secs = 3600
            near_duplicate_threshold = 0.01
            shortlist_size = 3
            title_match = "normalized"
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/music")));
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/srv/music/db/resolver.db"))
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.selection.recency_window_secs, Some(3600));
        assert_eq!(config.selection.near_duplicate_threshold, Some(0.01));
        assert_eq!(config.selection.shortlist_size, Some(3));
        assert_eq!(config.selection.title_match.as_deref(), Some("normalized"));
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = TomlConfig::parse("").unwrap();
        assert!(config.root_folder.is_none());
        assert!(config.database_path.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.selection, SelectionOverrides::default());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let result = TomlConfig::parse("[selection]\nrecency_window_secs = \"two hours\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_database_path_priority() {
        let root = PathBuf::from("/data/smp");
        let toml_config = TomlConfig {
            database_path: Some(PathBuf::from("/toml/db.sqlite")),
            ..Default::default()
        };

        assert_eq!(
            resolve_database_path(Some(Path::new("/cli/db.sqlite")), Some(&toml_config), &root),
            PathBuf::from("/cli/db.sqlite")
        );
        assert_eq!(
            resolve_database_path(None, Some(&toml_config), &root),
            PathBuf::from("/toml/db.sqlite")
        );
        assert_eq!(
            resolve_database_path(None, None, &root),
            root.join(DATABASE_FILE_NAME)
        );
    }
}
