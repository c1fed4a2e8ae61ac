//! # Configuration Management
//!
//! Handles all configuration for TrueStore tiers. Every section has sensible
//! defaults, so a TOML file only needs to name what it changes:
//!
//! ```toml
//! [hot]
//! max_entries = 1000
//!
//! [cold]
//! root_dir = "/var/lib/app/cold"
//! compression = { algorithm = "lz4" }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compression::CompressionConfig;
use crate::error::{Error, Result};
use crate::serialization::SerializerKind;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hot: HotConfig,
    pub cold: ColdConfig,
    pub migration: MigrationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| Error::Configuration {
            message: format!("Invalid TOML configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("Failed to read config {:?}", path), e))?;
        let config = Self::from_toml_str(&raw)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Configuration {
            message: format!("Failed to render configuration: {}", e),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.hot.validate()?;
        self.cold.validate()?;
        self.migration.validate()
    }
}

/// Hot tier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotConfig {
    pub max_entries: usize,
    /// Applied when an entry carries no `ttl` metadata
    pub default_ttl: Option<Duration>,
    /// Evict the least-recently-used entry when full instead of failing
    pub auto_evict: bool,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            default_ttl: Some(Duration::from_secs(300)),
            auto_evict: true,
        }
    }
}

impl HotConfig {
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Configuration {
                message: "hot.max_entries must be greater than 0".to_string(),
            });
        }
        if self.default_ttl == Some(Duration::ZERO) {
            return Err(Error::Configuration {
                message: "hot.default_ttl must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Cold tier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdConfig {
    pub root_dir: PathBuf,
    pub compression: CompressionConfig,
    pub serializer: SerializerKind,
    /// fsync temp files before renaming them into place
    pub sync_writes: bool,
    pub default_ttl: Option<Duration>,
}

impl Default for ColdConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("cold_storage"),
            compression: CompressionConfig::default(),
            serializer: SerializerKind::default(),
            sync_writes: true,
            default_ttl: None,
        }
    }
}

impl ColdConfig {
    pub fn at(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::Configuration {
                message: "cold.root_dir must not be empty".to_string(),
            });
        }
        if self.default_ttl == Some(Duration::ZERO) {
            return Err(Error::Configuration {
                message: "cold.default_ttl must be positive when set".to_string(),
            });
        }
        self.compression.validate()
    }
}

/// Promotion/demotion policy of the mixed tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Score a cold key must exceed to be copied into the hot tier
    pub promotion_threshold: f64,
    /// Scores halve once per elapsed window
    pub decay_window: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: 2.0,
            decay_window: Duration::from_secs(60),
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.promotion_threshold.is_finite() && self.promotion_threshold > 0.0) {
            return Err(Error::Configuration {
                message: format!(
                    "migration.promotion_threshold must be a positive number, got {}",
                    self.promotion_threshold
                ),
            });
        }
        if self.decay_window.as_millis() == 0 {
            return Err(Error::Configuration {
                message: "migration.decay_window must be at least 1ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration for hosts that install a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        format!("truestore_core={0},truestore_storage={0}", self.level.as_str())
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
