//! Single-worker embedding loop
//!
//! Advances one `parsed` object per tick to `embedded`: claims it with a
//! compare-and-set, asks the model for semantic chunks, persists them
//! relationally, pushes documents to the vector store, and records
//! chunk-to-vector links. Intentionally a single worker so the
//! `parsed -> embedding` handoff has no contention; concurrency can be
//! added later without API change.
//!
//! There is no two-phase commit across the two stores. Links are written
//! only after the vector store acknowledges every document, and a vector
//! is never deleted before its link, so the design tolerates orphaned
//! vectors but never phantom links.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};
use crate::processors::to_json_array;
use mnemo_common::CorrelationId;
use mnemo_config::EmbedderConfig;
use mnemo_data::{
    ChunkInsert, JobRepository, KnowledgeObject, ObjectRepository, ObjectStatus,
};
use mnemo_llm::ChunkingClient;
use mnemo_vector_data::{DocumentMetadata, VectorDocument, VectorStore};

/// Polling worker that embeds parsed objects one at a time
pub struct EmbeddingWorker {
    objects: Arc<dyn ObjectRepository>,
    jobs: Arc<dyn JobRepository>,
    llm: Arc<dyn ChunkingClient>,
    vectors: Arc<dyn VectorStore>,
    config: EmbedderConfig,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

fn decode_string_list(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

impl EmbeddingWorker {
    pub fn new(
        objects: Arc<dyn ObjectRepository>,
        jobs: Arc<dyn JobRepository>,
        llm: Arc<dyn ChunkingClient>,
        vectors: Arc<dyn VectorStore>,
        config: EmbedderConfig,
    ) -> Self {
        Self {
            objects,
            jobs,
            llm,
            vectors,
            config,
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    /// Request cooperative shutdown; `run` returns after the current tick
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a worker mid-tick still observes
        // the shutdown without waiting out the interval
        self.shutdown_notify.notify_one();
    }

    /// Run ticks until shutdown
    ///
    /// Ticks are strictly sequential, so a slow tick simply delays the
    /// next one; there is never more than one in flight.
    pub async fn run(&self) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            model = %self.config.model,
            "embedding worker started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = self.shutdown_notify.notified() => {}
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match self.tick().await {
                Ok(Some(object_id)) => debug!(object_id = %object_id, "tick processed object"),
                Ok(None) => {}
                Err(e) => error!(error = %e, "embedding tick failed"),
            }
        }

        info!("embedding worker stopped");
    }

    /// Process at most one parsed object
    ///
    /// Returns the object that was attempted, successfully or not, or
    /// `None` when nothing was claimable. Per-object failures are recorded
    /// on the object row and do not surface as errors here.
    ///
    /// # Errors
    ///
    /// Returns an error only when the candidate query or claim itself
    /// fails against the store.
    pub async fn tick(&self) -> IngestResult<Option<Uuid>> {
        let candidates = self
            .objects
            .get_next_by_status(ObjectStatus::Parsed, 1)
            .await?;
        let Some(object) = candidates.into_iter().next() else {
            return Ok(None);
        };

        // Race-free claim; a competing worker losing here just skips
        if !self
            .objects
            .transition_status(object.id, ObjectStatus::Parsed, ObjectStatus::Embedding)
            .await?
        {
            debug!(object_id = %object.id, "claim lost, skipping");
            return Ok(None);
        }

        // One correlation ID per claimed object, shared by every log line
        // of this tick
        let correlation_id = CorrelationId::new();

        let failure = match self.embed_object(&object, correlation_id).await {
            Ok(chunk_count) => {
                match self
                    .objects
                    .update_status(object.id, ObjectStatus::Embedded, None, None)
                    .await
                {
                    Ok(()) => {
                        info!(
                            object_id = %object.id,
                            chunk_count,
                            correlation_id = %correlation_id,
                            "object embedded"
                        );
                        self.finalize_job_success(object.id, correlation_id).await;
                        return Ok(Some(object.id));
                    }
                    Err(e) => format!("failed to record embedded status: {e}"),
                }
            }
            Err(e) => e.to_string(),
        };

        // The object must never be left in `embedding`
        error!(
            object_id = %object.id,
            correlation_id = %correlation_id,
            error = %failure,
            "embedding failed"
        );
        if let Err(e) = self
            .objects
            .update_status(
                object.id,
                ObjectStatus::EmbeddingFailed,
                None,
                Some(&failure),
            )
            .await
        {
            error!(object_id = %object.id, error = %e, "could not mark object embedding_failed");
        }
        self.finalize_job_failure(object.id, &failure).await;

        Ok(Some(object.id))
    }

    /// Chunk, persist, vectorize, and link one claimed object
    async fn embed_object(
        &self,
        object: &KnowledgeObject,
        correlation_id: CorrelationId,
    ) -> IngestResult<usize> {
        let text = object
            .cleaned_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or(IngestError::MissingCleanedText(object.id))?;

        let descriptors = self.llm.chunk_text(text, object.id).await?;
        if descriptors.is_empty() {
            return Err(IngestError::EmptyChunks(object.id));
        }

        // Seed chunks written at parse time occupy the low indices; model
        // chunks continue after them unless a descriptor pins its own
        let base = self.objects.get_chunks(object.id).await?.len() as i64;
        let inserts: Vec<ChunkInsert> = descriptors
            .iter()
            .enumerate()
            .map(|(position, descriptor)| ChunkInsert {
                chunk_idx: descriptor
                    .chunk_idx
                    .unwrap_or(base.saturating_add(position as i64)),
                content: descriptor.content.clone(),
                summary: descriptor.summary.clone(),
                tags_json: to_json_array(&descriptor.tags),
                propositions_json: to_json_array(&descriptor.propositions),
                token_count: descriptor.token_count,
            })
            .collect();
        self.objects.insert_chunks(object.id, inserts).await?;

        // The insert does not return rows; read back for the dense IDs
        let stored = self.objects.get_chunks(object.id).await?;
        if stored.is_empty() {
            return Err(IngestError::NoStoredChunks(object.id));
        }
        if stored.len() != descriptors.len() {
            warn!(
                object_id = %object.id,
                stored = stored.len(),
                proposed = descriptors.len(),
                correlation_id = %correlation_id,
                "stored chunk count differs from model output"
            );
        }

        let docs: Vec<VectorDocument> = stored
            .iter()
            .map(|chunk| VectorDocument {
                id: None,
                content: chunk.content.clone(),
                metadata: DocumentMetadata {
                    chunk_id: chunk.id,
                    object_id: object.id,
                    chunk_idx: chunk.chunk_idx,
                    title: object.title.clone(),
                    source_uri: object.source_uri.clone(),
                    tags: decode_string_list(chunk.tags_json.as_deref()),
                    propositions: decode_string_list(chunk.propositions_json.as_deref()),
                },
            })
            .collect();

        let vector_ids = self.vectors.add_documents(&docs).await?;
        if vector_ids.len() != stored.len() {
            // Links must pair exactly; writing a partial set would leave
            // the corpus silently under-indexed
            return Err(IngestError::VectorCountMismatch {
                object_id: object.id,
                expected: stored.len(),
                actual: vector_ids.len(),
            });
        }

        for (chunk, vector_id) in stored.iter().zip(&vector_ids) {
            self.objects
                .insert_embedding_link(chunk.id, &self.config.model, vector_id)
                .await?;
        }

        Ok(stored.len())
    }

    /// Terminate the producing job after its object embedded
    async fn finalize_job_success(&self, object_id: Uuid, correlation_id: CorrelationId) {
        match self.jobs.find_active_by_object(object_id).await {
            Ok(Some(job)) => {
                if let Err(e) = self.jobs.mark_as_completed(job.id, Some(object_id)).await {
                    error!(job_id = %job.id, error = %e, "failed to complete job after embedding");
                } else {
                    debug!(
                        job_id = %job.id,
                        object_id = %object_id,
                        correlation_id = %correlation_id,
                        "job completed"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => error!(object_id = %object_id, error = %e, "job lookup failed"),
        }
    }

    /// Fail the producing job when its object could not embed
    async fn finalize_job_failure(&self, object_id: Uuid, message: &str) {
        match self.jobs.find_active_by_object(object_id).await {
            Ok(Some(job)) => {
                if let Err(e) = self
                    .jobs
                    .mark_as_failed(job.id, message, Some("vectorizing"))
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to fail job after embedding error");
                }
            }
            Ok(None) => {}
            Err(e) => error!(object_id = %object_id, error = %e, "job lookup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_data::{
        NewObject, ObjectType, SqliteObjectRepository, SqliteJobRepository, run_migrations,
    };
    use mnemo_llm::MockChunkingClient;
    use mnemo_vector_data::MockVectorStore;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    struct Harness {
        _dir: tempfile::TempDir,
        objects: Arc<dyn ObjectRepository>,
        store: MockVectorStore,
        worker: EmbeddingWorker,
    }

    async fn harness_with(store: MockVectorStore, llm: MockChunkingClient) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("embedder-test.sqlite3"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let objects: Arc<dyn ObjectRepository> =
            Arc::new(SqliteObjectRepository::new(pool.clone()));
        let jobs: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool));

        let worker = EmbeddingWorker::new(
            Arc::clone(&objects),
            jobs,
            Arc::new(llm),
            Arc::new(store.clone()),
            EmbedderConfig::default(),
        );

        Harness {
            _dir: dir,
            objects,
            store,
            worker,
        }
    }

    async fn parsed_object(objects: &Arc<dyn ObjectRepository>, text: &str) -> KnowledgeObject {
        objects
            .create(NewObject {
                object_type: Some(ObjectType::Webpage),
                source_uri: Some("https://example.com/a".to_string()),
                status: Some(ObjectStatus::Parsed),
                cleaned_text: Some(text.to_string()),
                parsed_at: Some(chrono::Utc::now()),
                ..NewObject::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn happy_path_embeds_two_chunks() {
        let h = harness_with(MockVectorStore::new(), MockChunkingClient::new()).await;
        let object = parsed_object(&h.objects, "Hello world. Goodbye world.").await;

        let processed = h.worker.tick().await.unwrap();
        assert_eq!(processed, Some(object.id));

        let object = h.objects.get_by_id(object.id).await.unwrap().unwrap();
        assert_eq!(object.status, ObjectStatus::Embedded);

        let chunks = h.objects.get_chunks(object.id).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_idx, 0);
        assert_eq!(chunks[0].content, "Hello world.");
        assert_eq!(chunks[1].chunk_idx, 1);
        assert_eq!(chunks[1].content, "Goodbye world.");

        let links = h.objects.get_links_for_object(object.id).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_ne!(links[0].vector_id, links[1].vector_id);
        assert_eq!(h.store.document_count(), 2);
    }

    #[tokio::test]
    async fn idle_tick_is_a_no_op() {
        let h = harness_with(MockVectorStore::new(), MockChunkingClient::new()).await;
        assert_eq!(h.worker.tick().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_chunk_list_fails_the_object() {
        let h = harness_with(
            MockVectorStore::new(),
            MockChunkingClient::new().with_empty_chunks(),
        )
        .await;
        let object = parsed_object(&h.objects, "Some text.").await;

        h.worker.tick().await.unwrap();

        let object = h.objects.get_by_id(object.id).await.unwrap().unwrap();
        assert_eq!(object.status, ObjectStatus::EmbeddingFailed);
        assert!(object.error_info.is_some());
        assert!(h.objects.get_chunks(object.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_count_mismatch_leaves_no_links() {
        let h = harness_with(
            MockVectorStore::new().with_short_ids(1),
            MockChunkingClient::new(),
        )
        .await;
        let object = parsed_object(&h.objects, "Hello world. Goodbye world.").await;

        h.worker.tick().await.unwrap();

        let object = h.objects.get_by_id(object.id).await.unwrap().unwrap();
        assert_eq!(object.status, ObjectStatus::EmbeddingFailed);

        // Chunks remain for the re-ingest to clean up; links were never written
        assert_eq!(h.objects.get_chunks(object.id).await.unwrap().len(), 2);
        assert!(h.objects.get_links_for_object(object.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_outage_marks_embedding_failed() {
        let h = harness_with(
            MockVectorStore::new().with_add_failure(),
            MockChunkingClient::new(),
        )
        .await;
        let object = parsed_object(&h.objects, "Some text.").await;

        h.worker.tick().await.unwrap();

        let object = h.objects.get_by_id(object.id).await.unwrap().unwrap();
        assert_eq!(object.status, ObjectStatus::EmbeddingFailed);
        assert!(object.error_info.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn seed_chunk_keeps_indices_contiguous() {
        let h = harness_with(MockVectorStore::new(), MockChunkingClient::new()).await;

        // A PDF-style object arrives with its summary already chunked
        let object = h
            .objects
            .create_with_seed_chunk(
                NewObject {
                    object_type: Some(ObjectType::PdfDocument),
                    file_hash: Some("hash-1".to_string()),
                    status: Some(ObjectStatus::Parsed),
                    cleaned_text: Some("First fact. Second fact.".to_string()),
                    summary: Some("A summary".to_string()),
                    parsed_at: Some(chrono::Utc::now()),
                    ..NewObject::default()
                },
                mnemo_data::ChunkInsert {
                    chunk_idx: 0,
                    content: "A summary".to_string(),
                    summary: None,
                    tags_json: None,
                    propositions_json: None,
                    token_count: None,
                },
            )
            .await
            .unwrap();

        h.worker.tick().await.unwrap();

        let chunks = h.objects.get_chunks(object.id).await.unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        // Every stored chunk, seed included, is linked to a vector
        let links = h.objects.get_links_for_object(object.id).await.unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(h.store.document_count(), 3);
    }

    #[tokio::test]
    async fn claimed_object_is_skipped_by_second_tick() {
        let h = harness_with(MockVectorStore::new(), MockChunkingClient::new()).await;
        let object = parsed_object(&h.objects, "Some text.").await;

        // Simulate a competing claim
        assert!(
            h.objects
                .transition_status(object.id, ObjectStatus::Parsed, ObjectStatus::Embedding)
                .await
                .unwrap()
        );

        assert_eq!(h.worker.tick().await.unwrap(), None);
    }
}
