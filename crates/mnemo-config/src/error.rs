//! Configuration error types

use thiserror::Error;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed
    #[error("Invalid value for {variable}: {message}")]
    InvalidValue { variable: String, message: String },

    /// Validation of the assembled configuration failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// The platform data directory could not be resolved
    #[error("Could not determine a data directory for this platform")]
    NoDataDir,
}
