//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration only: where the database lives, where to listen
//! and how loud to log. Runtime settings (the owner shared secret) live in
//! the database `settings` table.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TASEX_ROOT_FOLDER";

/// Environment variable pointing at an explicit TOML file
pub const CONFIG_FILE_ENV: &str = "TASEX_CONFIG";

/// Name of the TOML file looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "tasex.toml";

/// Default HTTP port for the panel service
pub const DEFAULT_PORT: u16 = 5730;

/// Default idle lifetime of an anonymous wizard session, in minutes
pub const DEFAULT_SESSION_IDLE_MINUTES: u64 = 12 * 60;

/// Bootstrap configuration loaded from TOML
///
/// Every field has a default so a missing or partial file still starts the
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// SQLite database file (defaults to `<root>/tasex.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL, used to build panel links for QR codes
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Wizard sessions untouched for this long are dropped
    #[serde(default = "default_session_idle_minutes")]
    pub session_idle_minutes: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
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

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            bind_address: default_bind_address(),
            port: default_port(),
            public_base_url: default_public_base_url(),
            session_idle_minutes: default_session_idle_minutes(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_public_base_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_PORT)
}

fn default_session_idle_minutes() -> u64 {
    DEFAULT_SESSION_IDLE_MINUTES
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Database file, falling back to `<root>/tasex.db`
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join("tasex.db"),
        }
    }

    pub fn session_idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_idle_minutes.saturating_mul(60))
    }

    /// `host:port` string for the listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tasex"))
        .unwrap_or_else(|| PathBuf::from("./tasex_data"))
}

/// Load bootstrap configuration
///
/// Lookup order: explicit path (CLI) → `TASEX_CONFIG` → `<root>/tasex.toml`.
/// An explicitly named file that is missing or unreadable is an error; a
/// missing implicit file falls back to defaults with a warning.
pub fn load_toml_config(cli_path: Option<&Path>, root_folder: &Path) -> Result<TomlConfig> {
    let explicit = cli_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

    if let Some(path) = explicit {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        return TomlConfig::from_toml_str(&content);
    }

    let implicit = root_folder.join(CONFIG_FILE_NAME);
    match std::fs::read_to_string(&implicit) {
        Ok(content) => {
            info!("Loaded configuration from {}", implicit.display());
            TomlConfig::from_toml_str(&content)
        }
        Err(_) => {
            warn!(
                "No configuration file at {}, using built-in defaults",
                implicit.display()
            );
            Ok(TomlConfig::default())
        }
    }
}
