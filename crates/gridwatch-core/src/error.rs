//! Core error types for gridwatch-core.
//!
//! Each concern gets its own thiserror enum; `CoreError` wraps them for
//! callers that only need to report.

use std::path::PathBuf;
use thiserror::Error;

use crate::source::DataKind;

/// Core error type for gridwatch-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Feed fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Feed payload parse errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Fingerprint/kv store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors raised while fetching a feed source.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Transport-level failure
    #[error("HTTP request for {kind} failed: {source}")]
    Http {
        kind: DataKind,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("{kind} endpoint returned HTTP {status}")]
    Status { kind: DataKind, status: u16 },

    /// The per-source deadline elapsed
    #[error("{kind} fetch timed out after {timeout_secs}s")]
    Timeout { kind: DataKind, timeout_secs: u64 },

    /// Endpoint URL could not be built
    #[error("Invalid endpoint URL for {kind}: {message}")]
    InvalidUrl { kind: DataKind, message: String },

    /// Source not wired up in this fetcher
    #[error("No data available for {0}")]
    Unavailable(DataKind),
}

/// Errors raised while parsing a feed payload.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Payload is not valid JSON
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is missing
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field had an unexpected shape
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Errors raised by fingerprint or kv stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored digest could not be decoded
    #[error("Corrupt fingerprint for '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// Store lock was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Errors raised by notification and sound collaborators.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Notification could not be delivered
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// Sound could not be played
    #[error("Sound playback failed: {0}")]
    Sound(String),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
