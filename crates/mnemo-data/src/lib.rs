//! Mnemo data layer for SQLite state management
//!
//! Owns the relational half of the ingestion pipeline: the persistent job
//! queue, the content-object lifecycle, chunk storage, and the
//! chunk-to-vector embedding links.

// Module declarations
pub mod error;
pub mod fingerprint;
pub mod job_repository;
pub mod migrations;
pub mod models;
pub mod object_repository;
pub mod pool;
pub mod traits;

// Public exports
pub use error::{
    DatabaseError, DatabaseErrorExt, DatabaseOperation, DatabaseResult,
};
pub use fingerprint::{hash_bytes, hash_content};
pub use job_repository::SqliteJobRepository;
pub use migrations::run_migrations;
pub use mnemo_config::DatabaseConfig;
pub use models::{
    ChunkInsert, EmbeddingLink, IngestionJob, JobOptions, JobStatus, JobType, JobUpdate,
    KnowledgeObject, NewObject, ObjectChunk, ObjectStatus, ObjectType,
};
pub use object_repository::SqliteObjectRepository;
pub use pool::{create_pool, initialize_database};
pub use traits::{JobRepository, ObjectRepository};
