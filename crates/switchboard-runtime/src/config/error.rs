//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum LoadError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is unknown or its format feature is disabled.
    #[error("Unsupported or disabled configuration file format: .{0}")]
    UnsupportedFormat(String),

    /// Sources could not be merged into the schema.
    #[error("Failed to extract configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Validation { message: String },
}

impl LoadError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for LoadError {
    fn from(err: figment::Error) -> Self {
        Self::Parse(Box::new(err))
    }
}

/// Result type for configuration operations.
pub type LoadResult<T> = Result<T, LoadError>;
