//! # Error Handling
//!
//! Error kinds surfaced by every TrueStore tier.
//!
//! Each failing operation maps to exactly one variant so callers can branch:
//! evict and retry on [`Error::Capacity`], treat [`Error::NotFound`] as a cache
//! miss, and so on. The core never retries on its own.

use thiserror::Error;

/// Result type alias for TrueStore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for TrueStore
#[derive(Error, Debug)]
pub enum Error {
    /// Key absent, or present but logically expired
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Bounded tier is full and eviction is disabled
    #[error("Tier is at capacity ({capacity} entries) and eviction is disabled")]
    Capacity { capacity: usize },

    /// Filesystem failure in the cold tier
    #[error("Storage I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Persisted bytes could not be decoded back into a value
    #[error("Corrupted entry for key {key}: {message}")]
    Corruption { key: String, message: String },

    /// Value could not be encoded or decoded by the serializer
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// A promotion or demotion could not be completed
    #[error("Migration failed for key {key}: {message}")]
    Migration { key: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source,
        }
    }

    pub fn corruption(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Corruption {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    /// True for a plain miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if the caller can reasonably retry or fall back
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Capacity { .. } => true,
            Error::Io { .. } => true,
            Error::Migration { .. } => true,
            Error::Corruption { .. } => false,
            Error::Serialization { .. } => false,
            Error::Configuration { .. } => false,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Capacity { .. } => "CAPACITY",
            Error::Io { .. } => "STORAGE_IO",
            Error::Corruption { .. } => "CORRUPTION",
            Error::Serialization { .. } => "SERIALIZATION",
            Error::Migration { .. } => "MIGRATION",
            Error::Configuration { .. } => "CONFIG_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
