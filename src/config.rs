//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-index\config.toml
//! - macOS: ~/Library/Application Support/music-index/config.toml
//! - Linux: ~/.config/music-index/config.toml
//!
//! Every field has a default, so a partial or missing file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::DEFAULT_DB_NAME;

const APP_DIR: &str = "music-index";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
}

/// Library folders and watching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library roots, registered and scanned on `scan`
    pub paths: Vec<PathBuf>,

    /// Whether to watch roots for changes after a scan
    pub watch_for_changes: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            watch_for_changes: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file (empty = user data directory)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cover cache directory (empty = user cache directory)
    pub cover_dir: Option<PathBuf>,
}

impl Config {
    /// Database file, falling back to the user data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join(DEFAULT_DB_NAME)
        })
    }

    /// Cover cache directory, falling back to the user cache directory.
    pub fn cover_dir(&self) -> PathBuf {
        self.cache
            .cover_dir
            .clone()
            .unwrap_or_else(crate::cover::default_cache_dir)
    }

    /// Add a library root unless it's already listed. Returns whether it was added.
    pub fn add_library_path(&mut self, path: &Path) -> bool {
        if self.library.paths.iter().any(|p| p == path) {
            return false;
        }
        self.library.paths.push(path.to_path_buf());
        true
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!(target: "config", "Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from `path`, with the same fallbacks as [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!(target: "config", path = %path.display(), "No config file found, using defaults");
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!(target: "config", path = %path.display(), "Loaded config");
                config
            }
            Err(e) => {
                tracing::error!(target: "config", path = %path.display(), error = %e, "Failed to parse config file");
                tracing::warn!(target: "config", "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!(target: "config", path = %path.display(), error = %e, "Failed to read config file");
            Config::default()
        }
    }
}

/// Save configuration to the default location.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`.
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", path = %path.display(), "Saved config");
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
