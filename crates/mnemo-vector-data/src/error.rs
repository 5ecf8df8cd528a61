//! Error types for vector store operations

use thiserror::Error;

/// Result type alias for vector store operations
pub type VectorDataResult<T> = Result<T, VectorDataError>;

/// Errors that can occur during vector store operations
#[derive(Error, Debug)]
pub enum VectorDataError {
    /// Storage backend is unavailable or connection failed
    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store returned a malformed or incomplete response
    #[error("Vector store response invalid: {0}")]
    InvalidResponse(String),

    /// Storage backend specific error
    #[error("Vector store error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for VectorDataError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for VectorDataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
