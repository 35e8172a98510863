// Configuration File Support
//
// This module provides configuration file parsing for the modelquota service.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/modelquota/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on the backoff between two store attempts, in seconds
const MAX_RETRY_DELAY_SECS: u64 = 5;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener
    pub server: ServerConfig,

    /// Model catalog source
    pub catalog: CatalogConfig,

    /// Usage store backend
    pub store: StoreConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file holding the model definitions
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/models.json"),
        }
    }
}

/// Usage store backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart
    #[default]
    Memory,

    /// PostgREST-compatible table API
    Rest,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "rest" => Ok(StoreBackend::Rest),
            other => anyhow::bail!("Invalid store backend: {}. Must be 'memory' or 'rest'", other),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Rest => write!(f, "rest"),
        }
    }
}

/// Usage store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Which store to use
    pub backend: StoreBackend,

    /// Base URL of the table API (rest only)
    pub url: Option<String>,

    /// Service key (rest only)
    pub api_key: Option<String>,

    /// Table holding usage records (rest only)
    pub table: String,

    /// Timeout in seconds for one store request
    pub timeout_secs: u64,

    /// Attempts per store request, including the first
    pub max_attempts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            api_key: None,
            table: "usages".to_string(),
            timeout_secs: 10,
            max_attempts: 3,
        }
    }
}

impl StoreConfig {
    /// Deadline for one logical store call, retries included
    pub fn call_timeout(&self) -> Duration {
        let attempts = self.max_attempts.max(1) as u64;
        let backoff = MAX_RETRY_DELAY_SECS * (attempts - 1);
        Duration::from_secs(self.timeout_secs.saturating_mul(attempts) + backoff)
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose `/metrics`
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the effective configuration is invalid. A missing file yields the
    /// defaults (with environment overrides applied).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the effective configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/modelquota/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "modelquota", "modelquota") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("modelquota")
                .join("config.toml")
        }
    }

    /// Apply process environment overrides
    ///
    /// Environment variables take precedence over config file values:
    /// - MODELQUOTA_LOG_LEVEL, MODELQUOTA_LOG_FORMAT
    /// - MODELQUOTA_HOST, MODELQUOTA_PORT
    /// - MODELQUOTA_CATALOG_PATH
    /// - MODELQUOTA_STORE_BACKEND, MODELQUOTA_STORE_URL, MODELQUOTA_STORE_KEY,
    ///   MODELQUOTA_STORE_TABLE, MODELQUOTA_STORE_TIMEOUT_SECS
    /// - MODELQUOTA_METRICS_ENABLED
    fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`; unparsable values are ignored
    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging overrides
        if let Some(level) = lookup("MODELQUOTA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("MODELQUOTA_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Server overrides
        if let Some(host) = lookup("MODELQUOTA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MODELQUOTA_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        if let Some(path) = lookup("MODELQUOTA_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(path);
        }

        // Store overrides
        if let Some(backend) = lookup("MODELQUOTA_STORE_BACKEND") {
            if let Ok(backend) = backend.parse() {
                self.store.backend = backend;
            }
        }
        if let Some(url) = lookup("MODELQUOTA_STORE_URL") {
            self.store.url = Some(url);
        }
        if let Some(key) = lookup("MODELQUOTA_STORE_KEY") {
            self.store.api_key = Some(key);
        }
        if let Some(table) = lookup("MODELQUOTA_STORE_TABLE") {
            self.store.table = table;
        }
        if let Some(timeout) = lookup("MODELQUOTA_STORE_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                if timeout > 0 {
                    self.store.timeout_secs = timeout;
                }
            }
        }

        // Metrics overrides
        if let Some(enabled) = lookup("MODELQUOTA_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.server.host.trim().is_empty() {
            anyhow::bail!("Server host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.catalog.path.as_os_str().is_empty() {
            anyhow::bail!("Catalog path must not be empty");
        }

        if self.store.timeout_secs == 0 {
            anyhow::bail!("Store timeout must be > 0 seconds");
        }
        if self.store.max_attempts == 0 || self.store.max_attempts > 10 {
            anyhow::bail!("Store max_attempts must be between 1 and 10");
        }
        if self.store.backend == StoreBackend::Rest {
            if self.store.url.as_deref().map_or(true, |url| url.trim().is_empty()) {
                anyhow::bail!("Store backend 'rest' requires a url");
            }
            if self.store.api_key.as_deref().map_or(true, |key| key.is_empty()) {
                anyhow::bail!("Store backend 'rest' requires an api_key");
            }
            if self.store.table.trim().is_empty() {
                anyhow::bail!("Store backend 'rest' requires a table name");
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Copy safe to print, with secrets masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.store.api_key.is_some() {
            config.store.api_key = Some("********".to_string());
        }
        config
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
