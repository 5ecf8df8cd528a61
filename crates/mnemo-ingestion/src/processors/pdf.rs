//! PDF ingestion processor
//!
//! Reads a local file, fingerprints it, and either short-circuits to the
//! existing object for that fingerprint or extracts text, profiles the
//! document, and persists a `parsed` object with its seed chunk in one
//! transaction. The source file is copied into the content-addressed
//! store under `<data_dir>/pdfs/<hash>.pdf`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::ProcessorError;
use crate::fetch::TextExtractor;
use crate::processors::{JobProcessor, advance_stage, to_json_array};
use mnemo_config::IntakeConfig;
use mnemo_data::{
    ChunkInsert, IngestionJob, JobRepository, JobStatus, JobUpdate, NewObject, ObjectRepository,
    ObjectStatus, ObjectType, hash_bytes,
};
use mnemo_llm::ChunkingClient;

/// Longest text prefix used as the seed chunk when the model gives no summary
const SUMMARY_FALLBACK_CHARS: usize = 500;

/// Processor for `pdf` jobs
pub struct PdfProcessor {
    jobs: Arc<dyn JobRepository>,
    objects: Arc<dyn ObjectRepository>,
    llm: Arc<dyn ChunkingClient>,
    extractor: Arc<dyn TextExtractor>,
    config: IntakeConfig,
}

impl PdfProcessor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        objects: Arc<dyn ObjectRepository>,
        llm: Arc<dyn ChunkingClient>,
        extractor: Arc<dyn TextExtractor>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            jobs,
            objects,
            llm,
            extractor,
            config,
        }
    }

    /// Copy source bytes into the content-addressed store
    async fn store_file(&self, file_hash: &str, bytes: &[u8]) -> Result<PathBuf, ProcessorError> {
        let dir = self.config.data_dir.join("pdfs");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProcessorError::Transient(format!("creating pdf store: {e}")))?;

        let dest = dir.join(format!("{file_hash}.pdf"));
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Ok(dest);
        }
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| ProcessorError::Transient(format!("storing pdf: {e}")))?;
        Ok(dest)
    }
}

fn classify_io(path: &str, error: &std::io::Error) -> ProcessorError {
    if error.kind() == std::io::ErrorKind::NotFound {
        ProcessorError::InputFatal(format!("file not found: {path}"))
    } else {
        ProcessorError::Transient(format!("reading {path}: {error}"))
    }
}

fn file_name_of(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[async_trait]
impl JobProcessor for PdfProcessor {
    async fn process(&self, job: &IngestionJob) -> Result<(), ProcessorError> {
        let path = &job.source_identifier;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| classify_io(path, &e))?;
        if metadata.len() > self.config.max_file_size_bytes {
            return Err(ProcessorError::InputFatal(format!(
                "file exceeds {} bytes: {} is {} bytes",
                self.config.max_file_size_bytes,
                path,
                metadata.len()
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| classify_io(path, &e))?;
        let file_hash = hash_bytes(&bytes);
        debug!(job_id = %job.id, path, file_hash, "fingerprinted source file");

        // Duplicate policy: an existing live object for this fingerprint
        // short-circuits the whole pipeline. A row stuck in `embedding` is
        // a stale claim from a crashed run and gets re-ingested instead.
        if let Some(existing) = self.objects.find_by_file_hash(&file_hash).await? {
            if existing.status == ObjectStatus::Embedding {
                warn!(
                    job_id = %job.id,
                    object_id = %existing.id,
                    "stale in-flight object for fingerprint, re-ingesting"
                );
                self.objects.delete_object(existing.id).await?;
            } else {
                info!(
                    job_id = %job.id,
                    object_id = %existing.id,
                    "duplicate fingerprint, reusing existing object"
                );
                self.jobs
                    .mark_as_completed(job.id, Some(existing.id))
                    .await?;
                return Ok(());
            }
        }
        // Failed rows for this fingerprint are superseded by the fresh ingest
        self.objects.delete_failed_by_file_hash(&file_hash).await?;

        let internal_file_path = self.store_file(&file_hash, &bytes).await?;

        advance_stage(&self.jobs, job.id, JobStatus::ParsingContent).await?;
        let extracted = self.extractor.extract_pdf(&bytes)?;

        advance_stage(&self.jobs, job.id, JobStatus::AiProcessing).await?;
        let display_name = job
            .original_file_name
            .clone()
            .or_else(|| file_name_of(path));
        let profile = self
            .llm
            .profile_document(&extracted.cleaned_text, display_name.as_deref())
            .await?;

        advance_stage(&self.jobs, job.id, JobStatus::PersistingData).await?;
        let now = Utc::now();
        let summary = profile.summary.clone().unwrap_or_else(|| {
            extracted
                .cleaned_text
                .chars()
                .take(SUMMARY_FALLBACK_CHARS)
                .collect()
        });

        // Seed chunk carries the summary text; its own summary stays NULL
        // so the object row remains the single home of that string
        let object = self
            .objects
            .create_with_seed_chunk(
                NewObject {
                    object_type: Some(ObjectType::PdfDocument),
                    source_uri: display_name.clone(),
                    file_hash: Some(file_hash),
                    original_file_name: display_name,
                    title: profile.title.clone().or(extracted.title),
                    status: Some(ObjectStatus::Parsed),
                    cleaned_text: Some(extracted.cleaned_text),
                    summary: Some(summary.clone()),
                    ai_generated_metadata: serde_json::to_string(&profile).ok(),
                    tags_json: to_json_array(&profile.tags),
                    propositions_json: to_json_array(&profile.propositions),
                    internal_file_path: Some(internal_file_path.to_string_lossy().into_owned()),
                    parsed_at: Some(now),
                    summary_generated_at: Some(now),
                    ..NewObject::default()
                },
                ChunkInsert {
                    chunk_idx: 0,
                    content: summary,
                    summary: None,
                    tags_json: None,
                    propositions_json: None,
                    token_count: None,
                },
            )
            .await?;

        self.jobs
            .update(
                job.id,
                JobUpdate {
                    status: Some(JobStatus::Vectorizing),
                    related_object_id: Some(object.id),
                    ..JobUpdate::default()
                },
            )
            .await?;

        info!(job_id = %job.id, object_id = %object.id, "pdf parsed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockTextExtractor;
    use mnemo_data::{
        JobOptions, JobType, SqliteJobRepository, SqliteObjectRepository, run_migrations,
    };
    use mnemo_llm::MockChunkingClient;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        jobs: Arc<dyn JobRepository>,
        objects: Arc<dyn ObjectRepository>,
        llm: MockChunkingClient,
        processor: PdfProcessor,
        source_dir: PathBuf,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("pdf-test.sqlite3"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let jobs: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool.clone()));
        let objects: Arc<dyn ObjectRepository> = Arc::new(SqliteObjectRepository::new(pool));
        let llm = MockChunkingClient::new();
        let source_dir = dir.path().join("sources");
        std::fs::create_dir_all(&source_dir).unwrap();

        let processor = PdfProcessor::new(
            Arc::clone(&jobs),
            Arc::clone(&objects),
            Arc::new(llm.clone()),
            Arc::new(MockTextExtractor::new()),
            IntakeConfig {
                max_file_size_bytes: 1024,
                fetch_timeout: Duration::from_secs(5),
                data_dir: dir.path().join("data"),
            },
        );

        Harness {
            _dir: dir,
            jobs,
            objects,
            llm,
            processor,
            source_dir,
        }
    }

    fn write_source(h: &Harness, name: &str, contents: &[u8]) -> String {
        let path = h.source_dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn run_job(h: &Harness, path: &str) -> IngestionJob {
        let job = h
            .jobs
            .create(JobType::Pdf, path, JobOptions::default())
            .await
            .unwrap();
        h.jobs.mark_as_started(job.id).await.unwrap();
        h.processor.process(&job).await.unwrap();
        h.jobs.get_by_id(job.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn ingests_pdf_with_seed_chunk() {
        let h = harness().await;
        let path = write_source(&h, "doc.pdf", b"An important document. It has facts.");

        let job = run_job(&h, &path).await;
        assert_eq!(job.status, JobStatus::Vectorizing);

        let object = h
            .objects
            .get_by_id(job.related_object_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(object.status, ObjectStatus::Parsed);
        assert!(object.file_hash.is_some());
        assert!(object.internal_file_path.is_some());

        // File landed in the content-addressed store
        let stored = PathBuf::from(object.internal_file_path.as_deref().unwrap());
        assert!(stored.exists());
        assert!(stored.file_name().unwrap().to_string_lossy().ends_with(".pdf"));

        // Seed chunk carries the summary, its own summary is NULL
        let chunks = h.objects.get_chunks(object.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_idx, 0);
        assert_eq!(Some(chunks[0].content.as_str()), object.summary.as_deref());
        assert!(chunks[0].summary.is_none());
    }

    #[tokio::test]
    async fn duplicate_fingerprint_short_circuits() {
        let h = harness().await;
        let path = write_source(&h, "doc.pdf", b"Same bytes. Same fingerprint.");

        let first = run_job(&h, &path).await;
        let object_id = first.related_object_id.unwrap();
        let chunk_count = h.objects.get_chunks(object_id).await.unwrap().len();
        let profile_calls = h.llm.profile_call_count();

        // Second submission of identical bytes under a different name
        let path2 = write_source(&h, "renamed.pdf", b"Same bytes. Same fingerprint.");
        let second = run_job(&h, &path2).await;

        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.related_object_id, Some(object_id));
        // No model call, no new chunks
        assert_eq!(h.llm.profile_call_count(), profile_calls);
        assert_eq!(
            h.objects.get_chunks(object_id).await.unwrap().len(),
            chunk_count
        );
    }

    #[tokio::test]
    async fn failed_fingerprint_is_reingested_fresh() {
        let h = harness().await;
        let path = write_source(&h, "doc.pdf", b"Flaky document contents.");

        let first = run_job(&h, &path).await;
        let old_object_id = first.related_object_id.unwrap();
        h.objects
            .update_status(old_object_id, ObjectStatus::EmbeddingFailed, None, Some("boom"))
            .await
            .unwrap();

        let second = run_job(&h, &path).await;
        let new_object_id = second.related_object_id.unwrap();

        assert_ne!(new_object_id, old_object_id);
        assert!(h.objects.get_by_id(old_object_id).await.unwrap().is_none());
        assert_eq!(second.status, JobStatus::Vectorizing);
    }

    #[tokio::test]
    async fn oversized_file_is_input_fatal() {
        let h = harness().await;
        // Limit is 1024 in the harness; one byte over must be rejected
        let path = write_source(&h, "big.pdf", &vec![b'a'; 1025]);

        let job = h
            .jobs
            .create(JobType::Pdf, &path, JobOptions::default())
            .await
            .unwrap();
        h.jobs.mark_as_started(job.id).await.unwrap();

        let err = h.processor.process(&job).await.unwrap_err();
        assert!(matches!(err, ProcessorError::InputFatal(_)));
    }

    #[tokio::test]
    async fn file_at_exact_limit_is_accepted() {
        let h = harness().await;
        let path = write_source(&h, "exact.pdf", &vec![b'a'; 1024]);

        let job = run_job(&h, &path).await;
        assert_eq!(job.status, JobStatus::Vectorizing);
    }

    #[tokio::test]
    async fn missing_file_is_input_fatal() {
        let h = harness().await;
        let path = h.source_dir.join("nope.pdf").to_string_lossy().into_owned();

        let job = h
            .jobs
            .create(JobType::Pdf, &path, JobOptions::default())
            .await
            .unwrap();
        h.jobs.mark_as_started(job.id).await.unwrap();

        let err = h.processor.process(&job).await.unwrap_err();
        assert!(!err.retryable());
    }
}
