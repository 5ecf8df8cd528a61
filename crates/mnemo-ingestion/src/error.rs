//! Error types for the ingestion pipeline
//!
//! `ProcessorError` is the taxonomy the scheduler's retry policy keys on;
//! `IngestError` covers queue and embedding-worker internals.

use thiserror::Error;
use uuid::Uuid;

use mnemo_data::DatabaseError;
use mnemo_llm::LlmError;
use mnemo_vector_data::VectorDataError;

/// Result type alias for pipeline operations
pub type IngestResult<T> = Result<T, IngestError>;

/// Failure of a job processor, classified for the retry policy
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Network timeouts, rate limits, backend unavailability - retryable
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Unsupported, oversized, or malformed source - never retried
    #[error("Unusable input: {0}")]
    InputFatal(String),

    /// Model produced an empty or schema-violating result - retryable
    #[error("Model output unusable: {0}")]
    LlmSemantic(String),

    /// Cross-store bookkeeping violated an invariant; the object is marked
    /// failed but the job may re-enter a fresh attempt
    #[error("Store consistency violation: {0}")]
    StoreConsistency(String),

    /// Relational store failure - retryable
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ProcessorError {
    /// Whether the scheduler may consume retry budget on this failure
    ///
    /// Input-fatal errors terminate the job on the first attempt without
    /// touching the budget.
    pub const fn retryable(&self) -> bool {
        !matches!(self, Self::InputFatal(_))
    }
}

impl From<LlmError> for ProcessorError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ProviderUnavailable(msg) | LlmError::Rejected(msg) => Self::Transient(msg),
            LlmError::InvalidResponse(msg) => Self::LlmSemantic(msg),
            LlmError::Other(msg) => Self::Transient(msg),
        }
    }
}

impl From<FetchError> for ProcessorError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout(_) | FetchError::Network(_) => Self::Transient(err.to_string()),
            FetchError::Unsupported(_) | FetchError::Malformed(_) => {
                Self::InputFatal(err.to_string())
            }
        }
    }
}

/// Failure while fetching or extracting source content
#[derive(Error, Debug)]
pub enum FetchError {
    /// The source did not respond within the configured timeout
    #[error("Timed out fetching {0}")]
    Timeout(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The source exists but its format is not ingestible
    #[error("Unsupported content: {0}")]
    Unsupported(String),

    /// The source claims a supported format but cannot be parsed
    #[error("Malformed content: {0}")]
    Malformed(String),
}

/// Errors raised by the queue and the embedding worker
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Vector(#[from] VectorDataError),

    /// An object left `parsed` without its required cleaned text
    #[error("Object {0} has no cleaned text")]
    MissingCleanedText(Uuid),

    /// The model returned an empty chunk list
    #[error("Model returned no chunks for object {0}")]
    EmptyChunks(Uuid),

    /// The chunk read-back after insert found nothing
    #[error("No stored chunks for object {0}")]
    NoStoredChunks(Uuid),

    /// The vector store acknowledged a different number of documents than
    /// it was given; no links are written for this object
    #[error("Vector store returned {actual} IDs for {expected} chunks (object {object_id})")]
    VectorCountMismatch {
        object_id: Uuid,
        expected: usize,
        actual: usize,
    },
}
