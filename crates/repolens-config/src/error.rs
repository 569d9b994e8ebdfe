//! Configuration error types

use thiserror::Error;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },

    /// A validation rule failed after loading
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn invalid(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            variable: variable.into(),
            message: message.into(),
        }
    }
}
