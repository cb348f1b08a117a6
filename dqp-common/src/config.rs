//! Configuration loading
//!
//! Bootstrap configuration is resolved in priority order:
//! 1. Explicit path (caller supplied, highest priority)
//! 2. `DQP_CONFIG` environment variable
//! 3. Platform config file (`<config_dir>/dqp/config.toml`)
//! 4. Built-in defaults
//!
//! `DQP_DATABASE_PATH` and `DQP_MAX_LOCK_WAIT_MS` override the corresponding
//! values from whichever source won.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DQP_CONFIG";
/// Environment override for the database path
pub const DATABASE_PATH_ENV_VAR: &str = "DQP_DATABASE_PATH";
/// Environment override for the lock wait bound
pub const MAX_LOCK_WAIT_ENV_VAR: &str = "DQP_MAX_LOCK_WAIT_MS";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// SQLite database file. Falls back to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Upper bound on how long a mutation keeps retrying to acquire the
    /// entity lock before surfacing a retryable error
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// Buffered events per subscriber on the progress event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_lock_wait_ms: default_max_lock_wait_ms(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Database file to open, falling back to the platform default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve bootstrap configuration (see module docs for priority)
pub fn resolve_config(explicit_path: Option<&Path>) -> Result<TomlConfig> {
    let mut config = if let Some(path) = explicit_path {
        info!("Loading config from {}", path.display());
        load_toml_config(path)?
    } else if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        info!("Loading config from {} ({})", path, CONFIG_ENV_VAR);
        load_toml_config(Path::new(&path))?
    } else {
        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                load_toml_config(&path)?
            }
            _ => {
                debug!("No config file found, using built-in defaults");
                TomlConfig::default()
            }
        }
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut TomlConfig) {
    if let Ok(path) = std::env::var(DATABASE_PATH_ENV_VAR) {
        if !path.trim().is_empty() {
            config.database_path = Some(PathBuf::from(path));
        }
    }

    if let Ok(raw) = std::env::var(MAX_LOCK_WAIT_ENV_VAR) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => config.max_lock_wait_ms = ms,
            Err(e) => warn!(
                "Ignoring invalid {}='{}': {}",
                MAX_LOCK_WAIT_ENV_VAR, raw, e
            ),
        }
    }
}

/// Platform config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dqp").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("dqp"))
        .unwrap_or_else(|| PathBuf::from("./dqp_data"))
        .join("progress.db")
}
