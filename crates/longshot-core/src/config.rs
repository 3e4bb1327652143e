//! Configuration module for Longshot.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{Credentials, DevicePrefix};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the Longshot agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Device identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device identifier issued by the server.
    pub device_id: String,
    /// Device secret issued by the server.
    pub secret: String,
    /// Single-character path prefix.
    pub prefix: String,
}

/// Remote API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Root URL of the Longshot API.
    pub base_url: String,
    /// Per-request transport timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Background synchronizer cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between synchronization cycles.
    pub interval_secs: u64,
    /// Initial delay before retrying a failed first declaration.
    pub declare_backoff_secs: u64,
    /// Upper bound for the declaration backoff.
    pub max_declare_backoff_secs: u64,
}

/// Local persistence backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// `none`, `memory`, or `file`.
    pub backend: String,
    /// Data file used by the `file` backend.
    pub file: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/longshot/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("longshot")
            .join("config.yaml")
    }
}

impl DeviceConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.device_id.clone(), self.secret.clone())
    }

    /// Parsed prefix; `None` when `prefix` is not exactly one character.
    pub fn prefix(&self) -> Option<DevicePrefix> {
        self.prefix.parse().ok()
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn declare_backoff(&self) -> Duration {
        Duration::from_secs(self.declare_backoff_secs)
    }

    pub fn max_declare_backoff(&self) -> Duration {
        Duration::from_secs(self.max_declare_backoff_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            secret: String::new(),
            prefix: DevicePrefix::default().to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://longshot.smok4.development/".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            declare_backoff_secs: 5,
            max_declare_backoff_secs: 60,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("longshot");
        Self {
            backend: "none".to_string(),
            file: data_dir.join("pathpoints.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `persistence.backend`.
pub const VALID_PERSISTENCE_BACKENDS: &[&str] = &["none", "memory", "file"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- device ---
        if self.device.device_id.trim().is_empty() {
            push("device.device_id", "must not be empty".into());
        }
        if self.device.prefix().is_none() {
            push(
                "device.prefix",
                format!("must be exactly one character, got {:?}", self.device.prefix),
            );
        }

        // --- api ---
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            push(
                "api.base_url",
                format!("must be an http(s) URL, got {:?}", self.api.base_url),
            );
        }
        if self.api.request_timeout_secs == 0 {
            push("api.request_timeout_secs", "must be greater than 0".into());
        }

        // --- sync ---
        if self.sync.interval_secs == 0 {
            push("sync.interval_secs", "must be greater than 0".into());
        }
        if self.sync.declare_backoff_secs == 0 {
            push("sync.declare_backoff_secs", "must be greater than 0".into());
        }
        if self.sync.declare_backoff_secs > self.sync.max_declare_backoff_secs {
            push(
                "sync.declare_backoff_secs",
                format!(
                    "must not exceed sync.max_declare_backoff_secs ({})",
                    self.sync.max_declare_backoff_secs
                ),
            );
        }

        // --- persistence ---
        if !VALID_PERSISTENCE_BACKENDS.contains(&self.persistence.backend.as_str()) {
            push(
                "persistence.backend",
                format!(
                    "invalid backend {:?}; valid: {}",
                    self.persistence.backend,
                    VALID_PERSISTENCE_BACKENDS.join(", ")
                ),
            );
        }
        if self.persistence.backend == "file" && self.persistence.file.as_os_str().is_empty() {
            push(
                "persistence.file",
                "must be set when backend is \"file\"".into(),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level {:?}; valid: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- device ---

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.config.device.device_id = device_id.into();
        self
    }

    pub fn device_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.device.secret = secret.into();
        self
    }

    pub fn device_prefix(mut self, prefix: char) -> Self {
        self.config.device.prefix = prefix.to_string();
        self
    }

    // --- api ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn api_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.api.request_timeout_secs = seconds;
        self
    }

    // --- sync ---

    pub fn sync_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.interval_secs = seconds;
        self
    }

    pub fn sync_declare_backoff_secs(mut self, seconds: u64) -> Self {
        self.config.sync.declare_backoff_secs = seconds;
        self
    }

    pub fn sync_max_declare_backoff_secs(mut self, seconds: u64) -> Self {
        self.config.sync.max_declare_backoff_secs = seconds;
        self
    }

    // --- persistence ---

    pub fn persistence_backend(mut self, backend: impl Into<String>) -> Self {
        self.config.persistence.backend = backend.into();
        self
    }

    pub fn persistence_file(mut self, file: PathBuf) -> Self {
        self.config.persistence.file = file;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
