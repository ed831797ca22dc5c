//! Configuration module for crashgate.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::GroupSettings;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the crash pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashesConfig {
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
    pub app: AppConfig,
    pub logging: LoggingConfig,
}

/// Where reports and minidumps are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `{id}.json` files and the `minidump/` tree.
    pub root: PathBuf,
}

/// Channel group used for error logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Name of the channel group error logs are enqueued into.
    pub group_name: String,
    /// Logs per batch.
    pub max_logs_per_batch: usize,
    /// Milliseconds a log may wait before its batch is sent.
    pub batch_interval_ms: u64,
    /// Batches in flight at the same time.
    pub max_parallel_batches: usize,
    /// Ingestion endpoint overriding the channel default.
    pub custom_ingestion: Option<String>,
}

/// Application identity recorded in every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl CrashesConfig {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CrashesConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`CrashesConfig::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/crashgate/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("crashgate")
            .join("config.yaml")
    }

    /// Channel group settings derived from the delivery section.
    pub fn group_settings(&self) -> GroupSettings {
        GroupSettings {
            max_logs_per_batch: self.delivery.max_logs_per_batch,
            batch_interval: Duration::from_millis(self.delivery.batch_interval_ms),
            max_parallel_batches: self.delivery.max_parallel_batches,
            custom_ingestion: self.delivery.custom_ingestion.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default channel group for error logs.
pub const DEFAULT_ERROR_GROUP: &str = "groupErrors";

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("crashgate")
                .join("error"),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_ERROR_GROUP.to_string(),
            max_logs_per_batch: 1,
            batch_interval_ms: 3_000,
            max_parallel_batches: 3,
            custom_ingestion: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "crashgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
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
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"delivery.group_name"`.
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

impl CrashesConfig {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if self.storage.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.root".into(),
                message: "must not be empty".into(),
            });
        }

        // --- delivery ---
        if self.delivery.group_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "delivery.group_name".into(),
                message: "must not be empty".into(),
            });
        }
        if self.delivery.max_logs_per_batch == 0 {
            errors.push(ValidationError {
                field: "delivery.max_logs_per_batch".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.delivery.max_parallel_batches == 0 {
            errors.push(ValidationError {
                field: "delivery.max_parallel_batches".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let Some(url) = &self.delivery.custom_ingestion {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(ValidationError {
                    field: "delivery.custom_ingestion".into(),
                    message: format!("not an http(s) URL: {url}"),
                });
            }
        }

        // --- app ---
        if self.app.name.trim().is_empty() {
            errors.push(ValidationError {
                field: "app.name".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`CrashesConfig`] programmatically.
///
/// Starts from [`CrashesConfig::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use crashgate_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .storage_root(PathBuf::from("/var/lib/myapp/errors"))
///     .app("myapp", "2.1.0")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: CrashesConfig,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`CrashesConfig::default`] values.
    pub fn new() -> Self {
        Self {
            config: CrashesConfig::default(),
        }
    }

    pub fn storage_root(mut self, root: PathBuf) -> Self {
        self.config.storage.root = root;
        self
    }

    pub fn group_name(mut self, name: impl Into<String>) -> Self {
        self.config.delivery.group_name = name.into();
        self
    }

    pub fn max_logs_per_batch(mut self, n: usize) -> Self {
        self.config.delivery.max_logs_per_batch = n;
        self
    }

    pub fn batch_interval_ms(mut self, ms: u64) -> Self {
        self.config.delivery.batch_interval_ms = ms;
        self
    }

    pub fn max_parallel_batches(mut self, n: usize) -> Self {
        self.config.delivery.max_parallel_batches = n;
        self
    }

    pub fn custom_ingestion(mut self, url: impl Into<String>) -> Self {
        self.config.delivery.custom_ingestion = Some(url.into());
        self
    }

    pub fn app(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.app.name = name.into();
        self.config.app.version = version.into();
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the final [`CrashesConfig`].
    pub fn build(self) -> CrashesConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
