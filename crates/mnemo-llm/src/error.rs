//! Error types for language-model operations

use thiserror::Error;

/// Result type alias for language-model operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur when calling the language model
#[derive(Error, Debug)]
pub enum LlmError {
    /// The provider is unreachable or timed out
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected the request (rate limit, auth, quota)
    #[error("LLM request rejected: {0}")]
    Rejected(String),

    /// The model responded but the payload violated the expected schema
    #[error("LLM response invalid: {0}")]
    InvalidResponse(String),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
