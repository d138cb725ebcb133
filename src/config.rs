//! Application Configuration
//!
//! Settings are built once at startup and handed to each component's
//! constructor. Defaults are overridden by an optional YAML file, which is in
//! turn overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::error::Error;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

pub use crate::metadata::config::{MetadataBackend, MetadataConfig};
pub use crate::storage::config::StorageConfig;

/// Environment variable naming the YAML config file
pub const CONFIG_PATH_ENV: &str = "CURLDROP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Upload directory configuration
    pub storage: StorageConfig,
    /// Metadata configuration
    pub metadata: MetadataConfig,
    /// Expiration worker configuration
    pub expiration: ExpirationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum accepted request body in bytes
    pub max_body_size: u64,
    /// Public prefix for retrieval links, always ending in `/`
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            workers: 4,
            max_body_size: 1500 * 1024 * 1024,
            base_url: "http://example.com/".to_string(),
        }
    }
}

/// Expiration worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    /// Run the expiration worker
    pub enabled: bool,
    /// Record time-to-live in seconds
    pub expires: u64,
    /// Seconds between sweeps
    pub sweep_interval: u64,
    /// Seconds a file without a record may sit idle before it is collected
    pub orphan_grace: u64,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expires: 3600 * 24,
            sweep_interval: 300, // 5 minutes
            orphan_grace: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Box<dyn Error>>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("Invalid value for {}: {:?} ({})", key, value, e).into())
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
fn lexical_absolute(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

impl AppConfig {
    /// YAML file named by `CURLDROP_CONFIG`, or `config.yaml`.
    pub fn source_path() -> PathBuf {
        env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
            .into()
    }

    /// Load `source_path()` if it exists, then apply environment overrides.
    pub fn load() -> Result<Self, Box<dyn Error>> {
        Self::load_from(&Self::source_path())
    }

    /// Runs before logging is set up, so it reports through its result only.
    pub fn load_from(config_path: &Path) -> Result<Self, Box<dyn Error>> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            serde_yaml::from_str::<AppConfig>(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup using the recognized variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), Box<dyn Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE") {
            self.metadata.db_path = v;
        }
        if let Some(v) = lookup("METADATA_BACKEND") {
            self.metadata.backend = v.parse::<MetadataBackend>()?;
        }
        if let Some(v) = lookup("UPLOADDIR") {
            self.storage.upload_dir = v;
        }
        if let Some(v) = lookup("BUFFSIZE") {
            self.storage.chunk_size = parse("BUFFSIZE", &v)?;
        }
        if let Some(v) = lookup("ALLOWED_EXTENSIONS") {
            self.storage.allowed_extensions = v
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(v) = lookup("BASEURL") {
            self.server.base_url = v;
        }
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse("PORT", &v)?;
        }
        if let Some(v) = lookup("WORKERS") {
            self.server.workers = parse("WORKERS", &v)?;
        }
        if let Some(v) = lookup("SERVERBUFF") {
            self.server.max_body_size = parse("SERVERBUFF", &v)?;
        }
        if let Some(v) = lookup("EXPIRATION_ENABLED") {
            self.expiration.enabled = parse("EXPIRATION_ENABLED", &v)?;
        }
        if let Some(v) = lookup("EXPIRES") {
            self.expiration.expires = parse("EXPIRES", &v)?;
        }
        if let Some(v) = lookup("SWEEP_INTERVAL") {
            self.expiration.sweep_interval = parse("SWEEP_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("ORPHAN_GRACE") {
            self.expiration.orphan_grace = parse("ORPHAN_GRACE", &v)?;
        }
        if let Some(v) = lookup("LOG_CONFIG") {
            self.logging.config_file = v;
        }

        self.normalize()
    }

    /// Check invariants and canonicalize values.
    pub fn normalize(&mut self) -> Result<(), Box<dyn Error>> {
        if self.storage.chunk_size == 0 {
            return Err("BUFFSIZE must be greater than zero".into());
        }
        if !self.server.base_url.ends_with('/') {
            self.server.base_url.push('/');
        }
        for ext in self.storage.allowed_extensions.iter_mut() {
            *ext = ext.to_lowercase();
        }
        // The orphan sweep owns the upload directory.
        if self.metadata.backend == MetadataBackend::SQLite {
            let db_path = lexical_absolute(Path::new(&self.metadata.db_path))?;
            let upload_dir = lexical_absolute(Path::new(&self.storage.upload_dir))?;
            if db_path.starts_with(&upload_dir) {
                return Err(format!(
                    "DATABASE {} must not live inside UPLOADDIR {}",
                    self.metadata.db_path, self.storage.upload_dir
                )
                .into());
            }
        }
        Ok(())
    }
}
