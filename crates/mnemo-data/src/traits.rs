//! Repository traits for dependency injection and testing

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::{
    ChunkInsert, EmbeddingLink, IngestionJob, JobOptions, JobStatus, JobType, JobUpdate,
    KnowledgeObject, NewObject, ObjectChunk, ObjectStatus,
};

/// Data-access layer over the persisted job table
///
/// All operations are atomic with respect to concurrent repositories
/// sharing the same store. Methods surface the underlying store error
/// unchanged; they do not retry.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job with status `queued` and zero attempts
    async fn create(
        &self,
        job_type: JobType,
        source_identifier: &str,
        options: JobOptions,
    ) -> DatabaseResult<IngestionJob>;

    /// Fetch a job by ID
    async fn get_by_id(&self, id: Uuid) -> DatabaseResult<Option<IngestionJob>>;

    /// Read up to `limit` runnable jobs without claiming them
    ///
    /// Runnable means `queued`, or `retry_pending` with `next_attempt_at`
    /// in the past, filtered by `allowed_types` and ordered by
    /// `priority DESC, created_at ASC`.
    async fn get_next_jobs(
        &self,
        limit: usize,
        allowed_types: &[JobType],
    ) -> DatabaseResult<Vec<IngestionJob>>;

    /// General-purpose partial mutation; returns whether a row changed
    async fn update(&self, id: Uuid, update: JobUpdate) -> DatabaseResult<bool>;

    /// Atomically claim a job for processing
    ///
    /// Sets status to `processing_source`, increments `attempts`, and
    /// stamps `last_attempt_at` - but only if the row is still claimable
    /// (`queued` or `retry_pending`). The caller must only proceed when
    /// this returns `true`: a `false` means another scheduler won the race.
    async fn mark_as_started(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Terminal success; stamps `completed_at`
    async fn mark_as_completed(
        &self,
        id: Uuid,
        related_object_id: Option<Uuid>,
    ) -> DatabaseResult<()>;

    /// Terminal failure; stamps `completed_at` and records diagnostics
    async fn mark_as_failed(
        &self,
        id: Uuid,
        error_info: &str,
        failed_stage: Option<&str>,
    ) -> DatabaseResult<()>;

    /// Schedule a retry after `delay`; the job becomes runnable once
    /// `next_attempt_at` passes
    async fn mark_as_retryable(
        &self,
        id: Uuid,
        error_info: &str,
        failed_stage: Option<&str>,
        delay: Duration,
    ) -> DatabaseResult<()>;

    /// Return a `failed` or `retry_pending` job to `queued`, clearing its
    /// error fields; returns whether a row changed
    async fn requeue(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Cancel a job that has not reached a terminal state; stamps
    /// `completed_at` so terminal-state invariants hold
    async fn mark_as_cancelled(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Count jobs per status
    async fn get_stats(&self) -> DatabaseResult<HashMap<JobStatus, i64>>;

    /// Delete terminal jobs completed more than `days` ago; returns the
    /// number of rows removed
    async fn cleanup_old_jobs(&self, days: u32) -> DatabaseResult<u64>;

    /// Find the non-terminal job that produced the given object, if any
    ///
    /// Used by the embedding worker to terminate the producing job after
    /// its object finishes embedding.
    async fn find_active_by_object(&self, object_id: Uuid)
    -> DatabaseResult<Option<IngestionJob>>;
}

/// Data-access layer over content objects, chunks, and embedding links
#[async_trait]
pub trait ObjectRepository: Send + Sync {
    /// Insert a new object row
    async fn create(&self, object: NewObject) -> DatabaseResult<KnowledgeObject>;

    /// Insert an object and its seed chunk in a single transaction
    ///
    /// A crash cannot leave an object without its chunk 0.
    async fn create_with_seed_chunk(
        &self,
        object: NewObject,
        seed: ChunkInsert,
    ) -> DatabaseResult<KnowledgeObject>;

    /// Fetch an object by ID
    async fn get_by_id(&self, id: Uuid) -> DatabaseResult<Option<KnowledgeObject>>;

    /// Find the live (non-failed) object carrying this fingerprint
    async fn find_by_file_hash(&self, file_hash: &str)
    -> DatabaseResult<Option<KnowledgeObject>>;

    /// Delete failed rows carrying this fingerprint; returns rows removed
    async fn delete_failed_by_file_hash(&self, file_hash: &str) -> DatabaseResult<u64>;

    /// Unconditional status write with optional `parsed_at` / `error_info`
    async fn update_status(
        &self,
        id: Uuid,
        status: ObjectStatus,
        parsed_at: Option<chrono::DateTime<chrono::Utc>>,
        error_info: Option<&str>,
    ) -> DatabaseResult<()>;

    /// Compare-and-set status transition
    ///
    /// The race-free handoff between ingestion workers and the embedding
    /// worker: returns `true` iff the row was in `from` and is now in `to`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: ObjectStatus,
        to: ObjectStatus,
    ) -> DatabaseResult<bool>;

    /// Read up to `limit` objects in the given status, oldest first
    async fn get_next_by_status(
        &self,
        status: ObjectStatus,
        limit: usize,
    ) -> DatabaseResult<Vec<KnowledgeObject>>;

    /// Delete an object; chunks and embedding links cascade
    async fn delete_object(&self, id: Uuid) -> DatabaseResult<bool>;

    /// Insert chunks for an object as a single transaction; returns the
    /// number inserted
    async fn insert_chunks(
        &self,
        object_id: Uuid,
        chunks: Vec<ChunkInsert>,
    ) -> DatabaseResult<u64>;

    /// Read stored chunks ordered by `chunk_idx`
    async fn get_chunks(&self, object_id: Uuid) -> DatabaseResult<Vec<ObjectChunk>>;

    /// Record the link between a chunk and its external vector ID
    ///
    /// Idempotent: a unique-key conflict on `vector_id` (or on
    /// `(chunk_id, model)`) resolves to the existing row.
    async fn insert_embedding_link(
        &self,
        chunk_id: i64,
        model: &str,
        vector_id: &str,
    ) -> DatabaseResult<EmbeddingLink>;

    /// Read all embedding links for an object's chunks
    async fn get_links_for_object(&self, object_id: Uuid) -> DatabaseResult<Vec<EmbeddingLink>>;

    /// Count objects per status
    async fn count_by_status(&self) -> DatabaseResult<HashMap<ObjectStatus, i64>>;
}
