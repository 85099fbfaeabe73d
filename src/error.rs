use std::path::PathBuf;
use thiserror::Error;

use crate::chain::ChatError;
use crate::document::ParseError;
use crate::engine::IndexingError;
use crate::generation::GenerationError;

/// Main error type for Pagechat
#[derive(Error, Debug)]
pub enum PagechatError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Uploaded document could not be read
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Chunking or index construction failed
    #[error(transparent)]
    Indexing(#[from] IndexingError),

    /// Chat turn failed
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Generation backend failed
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Pagechat operations
pub type Result<T> = std::result::Result<T, PagechatError>;
