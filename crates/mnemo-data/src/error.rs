//! Structured error handling for the data layer
//!
//! Provides error types with full context for database operations,
//! connection management, and transactional failures.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for database operations
pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;

/// Database operation type for error context
#[derive(Debug, Clone)]
pub enum DatabaseOperation {
    /// Job queue operations
    CreateJob {
        job_type: String,
    },
    GetJob {
        job_id: Uuid,
    },
    GetNextJobs {
        limit: usize,
    },
    UpdateJob {
        job_id: Uuid,
    },
    ClaimJob {
        job_id: Uuid,
    },
    CompleteJob {
        job_id: Uuid,
    },
    FailJob {
        job_id: Uuid,
    },
    ScheduleRetry {
        job_id: Uuid,
    },
    JobStats,
    CleanupJobs {
        days: u32,
    },
    FindJobByObject {
        object_id: Uuid,
    },

    /// Object lifecycle operations
    CreateObject {
        object_type: String,
    },
    GetObject {
        object_id: Uuid,
    },
    FindObjectByHash,
    UpdateObjectStatus {
        object_id: Uuid,
    },
    TransitionObjectStatus {
        object_id: Uuid,
    },
    NextObjectsByStatus {
        status: String,
    },
    DeleteObject {
        object_id: Uuid,
    },
    ObjectStats,

    /// Chunk and embedding-link operations
    InsertChunks {
        object_id: Uuid,
        chunk_count: usize,
    },
    GetChunks {
        object_id: Uuid,
    },
    InsertEmbeddingLink {
        chunk_id: i64,
    },
    GetEmbeddingLinks {
        object_id: Uuid,
    },

    /// Generic operations
    Query {
        description: String,
    },
    Transaction {
        description: String,
    },
    Migration {
        version: i64,
    },
}

impl fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateJob { job_type } => write!(f, "create_job(type={job_type})"),
            Self::GetJob { job_id } => write!(f, "get_job(job_id={job_id})"),
            Self::GetNextJobs { limit } => write!(f, "get_next_jobs(limit={limit})"),
            Self::UpdateJob { job_id } => write!(f, "update_job(job_id={job_id})"),
            Self::ClaimJob { job_id } => write!(f, "claim_job(job_id={job_id})"),
            Self::CompleteJob { job_id } => write!(f, "complete_job(job_id={job_id})"),
            Self::FailJob { job_id } => write!(f, "fail_job(job_id={job_id})"),
            Self::ScheduleRetry { job_id } => write!(f, "schedule_retry(job_id={job_id})"),
            Self::JobStats => write!(f, "job_stats"),
            Self::CleanupJobs { days } => write!(f, "cleanup_jobs(days={days})"),
            Self::FindJobByObject { object_id } => {
                write!(f, "find_job_by_object(object_id={object_id})")
            }

            Self::CreateObject { object_type } => write!(f, "create_object(type={object_type})"),
            Self::GetObject { object_id } => write!(f, "get_object(object_id={object_id})"),
            Self::FindObjectByHash => write!(f, "find_object_by_hash"),
            Self::UpdateObjectStatus { object_id } => {
                write!(f, "update_object_status(object_id={object_id})")
            }
            Self::TransitionObjectStatus { object_id } => {
                write!(f, "transition_object_status(object_id={object_id})")
            }
            Self::NextObjectsByStatus { status } => {
                write!(f, "next_objects_by_status(status={status})")
            }
            Self::DeleteObject { object_id } => write!(f, "delete_object(object_id={object_id})"),
            Self::ObjectStats => write!(f, "object_stats"),

            Self::InsertChunks {
                object_id,
                chunk_count,
            } => write!(
                f,
                "insert_chunks(object_id={object_id}, count={chunk_count})"
            ),
            Self::GetChunks { object_id } => write!(f, "get_chunks(object_id={object_id})"),
            Self::InsertEmbeddingLink { chunk_id } => {
                write!(f, "insert_embedding_link(chunk_id={chunk_id})")
            }
            Self::GetEmbeddingLinks { object_id } => {
                write!(f, "get_embedding_links(object_id={object_id})")
            }

            Self::Query { description } => write!(f, "query({description})"),
            Self::Transaction { description } => write!(f, "transaction({description})"),
            Self::Migration { version } => write!(f, "migration(v{version})"),
        }
    }
}

/// Database error with operation context
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection pool creation failed
    #[error("Failed to create connection pool: {message}")]
    PoolCreationFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// Query execution error
    #[error("Query failed for operation '{operation}': {message}")]
    QueryFailed {
        operation: Box<DatabaseOperation>,
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// Constraint violation
    #[error("Constraint violation for operation '{operation}': {constraint}")]
    ConstraintViolation {
        constraint: String,
        operation: Box<DatabaseOperation>,
        #[source]
        source: sqlx::Error,
    },

    /// Transaction rollback
    #[error("Transaction rolled back for operation '{operation}': {reason}")]
    TransactionRollback {
        operation: Box<DatabaseOperation>,
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Stored data violates an expected invariant
    #[error("Data integrity error: {message} (operation='{operation}')")]
    DataIntegrityError {
        operation: Box<DatabaseOperation>,
        message: String,
    },

    /// Migration error
    #[error("Database migration failed at version {version}: {message}")]
    MigrationFailed {
        version: i64,
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// Unexpected database state
    #[error("Unexpected database state for operation '{operation}': {message}")]
    UnexpectedState {
        operation: Box<DatabaseOperation>,
        message: String,
    },
}

impl DatabaseError {
    /// Create a query failed error from `sqlx::Error`, classifying
    /// constraint violations separately
    pub fn query_failed(operation: DatabaseOperation, source: sqlx::Error) -> Self {
        if let Some(db_err) = source.as_database_error() {
            if let Some(constraint) = db_err.constraint() {
                return Self::ConstraintViolation {
                    constraint: constraint.to_string(),
                    operation: Box::new(operation),
                    source,
                };
            }
        }

        let message = source.to_string();
        Self::QueryFailed {
            operation: Box::new(operation),
            message,
            source,
        }
    }

    /// Create a data-integrity error for a row that decoded into an
    /// impossible state
    pub fn integrity(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::DataIntegrityError {
            operation: Box::new(operation),
            message: message.into(),
        }
    }
}

/// Extension trait for converting sqlx errors with context
#[allow(clippy::result_large_err)]
pub trait DatabaseErrorExt<T> {
    /// Convert to `DatabaseError` with operation context
    ///
    /// # Errors
    /// Returns `DatabaseError` carrying the failed operation
    fn map_db_err(self, operation: DatabaseOperation) -> DatabaseResult<T>;
}

impl<T> DatabaseErrorExt<T> for std::result::Result<T, sqlx::Error> {
    fn map_db_err(self, operation: DatabaseOperation) -> DatabaseResult<T> {
        self.map_err(|e| DatabaseError::query_failed(operation, e))
    }
}
