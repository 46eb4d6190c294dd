//! Error types for Quotacast

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuotacastError>;

#[derive(Error, Debug)]
pub enum QuotacastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Content generation failed: {0}")]
    Generator(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QuotacastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            QuotacastError::InvalidInput(_) => 3,
            QuotacastError::Transport(TransportError::Forbidden(_)) => 2,
            QuotacastError::Transport(_) => 1,
            QuotacastError::Config(_) => 1,
            QuotacastError::Store(_) => 1,
            QuotacastError::Generator(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupted state file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Another run holds the lock at {0}")]
    Locked(PathBuf),
}

/// Failures reported by a publish transport.
///
/// Only `Forbidden` is permanent; every other variant may succeed on retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Posting failed: {0}")]
    Posting(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Forbidden(_))
    }
}
