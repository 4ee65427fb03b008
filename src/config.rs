//! Configuration for freightline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (FREIGHTLINE_HOME, FREIGHTLINE_DB)
//! 2. Config file (.freightline/config.yaml)
//! 3. Defaults (~/.freightline)
//!
//! Config file discovery:
//! - Searches current directory and parents for .freightline/config.yaml
//! - Paths in config file are relative to the .freightline/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::EngineSettings;

pub const CONFIG_DIR: &str = ".freightline";
pub const ENV_HOME: &str = "FREIGHTLINE_HOME";
pub const ENV_DB: &str = "FREIGHTLINE_DB";

const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_EMAIL: &str = "admin@localhost";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Database file (relative to .freightline/)
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 0 disables the deadline
    pub operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    pub enabled: Option<bool>,
    pub default_email: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub operation_timeout_ms: u64,
    pub notifications_enabled: bool,
    /// Recipient for jobs without a notification email
    pub default_email: String,
}

impl ResolvedConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            operation_timeout: self.operation_timeout(),
            notifications_enabled: self.notifications_enabled,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
pub fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge the file (if any) with environment overrides
fn resolve(
    file: Option<(&Path, ConfigFile)>,
    env_home: Option<PathBuf>,
    env_db: Option<PathBuf>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path.to_path_buf()), config),
        None => (None, ConfigFile::default()),
    };
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = env_home
        .or_else(|| config_dir.clone())
        .unwrap_or(default_home);

    let database = env_db.unwrap_or_else(|| match (&config.database.path, &config_dir) {
        (Some(db), Some(dir)) => resolve_path(dir, db),
        (Some(db), None) => PathBuf::from(db),
        _ => paths::database_file(&home),
    });

    let engine = config.engine.as_ref();
    let notifications = config.notifications.as_ref();

    ResolvedConfig {
        home,
        database,
        config_file,
        operation_timeout_ms: engine
            .and_then(|e| e.operation_timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS),
        notifications_enabled: notifications.and_then(|n| n.enabled).unwrap_or(true),
        default_email: notifications
            .and_then(|n| n.default_email.clone())
            .unwrap_or_else(|| DEFAULT_EMAIL.to_string()),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    let env_home = std::env::var(ENV_HOME).ok().map(PathBuf::from);
    let env_db = std::env::var(ENV_DB).ok().map(PathBuf::from);

    Ok(resolve(
        file.as_ref().map(|(path, config)| (path.as_path(), config.clone())),
        env_home,
        env_db,
        default_home,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
