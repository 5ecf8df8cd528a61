//! Bookmark batch import processor
//!
//! Decodes its processor-private payload (a list of bookmark entries),
//! de-duplicates by URL, and persists one `parsed` bookmark object per
//! entry. Unlike the URL and PDF pipelines this is a single-stage job: the
//! processor marks it completed itself; the objects it created flow
//! through the embedding worker independently.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ProcessorError;
use crate::processors::{JobProcessor, advance_stage};
use mnemo_data::{
    IngestionJob, JobRepository, JobStatus, JobUpdate, NewObject, ObjectRepository, ObjectStatus,
    ObjectType,
};

/// One imported bookmark
#[derive(Debug, Deserialize)]
struct BookmarkEntry {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    folder: Option<String>,
}

/// Shape of `job_specific_data` for bookmark batches
#[derive(Debug, Deserialize)]
struct BookmarkBatchPayload {
    #[serde(default)]
    bookmarks: Vec<BookmarkEntry>,
}

/// Processor for `bookmark_batch` jobs
pub struct BookmarkBatchProcessor {
    jobs: Arc<dyn JobRepository>,
    objects: Arc<dyn ObjectRepository>,
}

impl BookmarkBatchProcessor {
    pub fn new(jobs: Arc<dyn JobRepository>, objects: Arc<dyn ObjectRepository>) -> Self {
        Self { jobs, objects }
    }
}

/// Build the embeddable text for one bookmark
fn bookmark_text(entry: &BookmarkEntry) -> String {
    let mut text = String::new();
    if let Some(title) = &entry.title {
        text.push_str(title);
        text.push_str(". ");
    }
    text.push_str(&entry.url);
    if let Some(folder) = &entry.folder {
        text.push_str(" (saved under ");
        text.push_str(folder);
        text.push(')');
    }
    text
}

#[async_trait]
impl JobProcessor for BookmarkBatchProcessor {
    async fn process(&self, job: &IngestionJob) -> Result<(), ProcessorError> {
        let payload = job
            .job_specific_data
            .clone()
            .ok_or_else(|| ProcessorError::InputFatal("bookmark batch has no payload".into()))?;
        let batch: BookmarkBatchPayload = serde_json::from_value(payload)
            .map_err(|e| ProcessorError::InputFatal(format!("bad bookmark payload: {e}")))?;
        if batch.bookmarks.is_empty() {
            return Err(ProcessorError::InputFatal("bookmark batch is empty".into()));
        }

        advance_stage(&self.jobs, job.id, JobStatus::ParsingContent).await?;

        // Browser exports routinely repeat a URL across folders
        let mut seen = HashSet::new();
        let mut duplicates_skipped = 0_usize;
        let entries: Vec<&BookmarkEntry> = batch
            .bookmarks
            .iter()
            .filter(|entry| {
                if seen.insert(entry.url.clone()) {
                    true
                } else {
                    duplicates_skipped += 1;
                    false
                }
            })
            .collect();

        advance_stage(&self.jobs, job.id, JobStatus::PersistingData).await?;

        let now = Utc::now();
        let mut created: Vec<Uuid> = Vec::with_capacity(entries.len());
        for entry in entries {
            let object = self
                .objects
                .create(NewObject {
                    object_type: Some(ObjectType::Bookmark),
                    source_uri: Some(entry.url.clone()),
                    title: entry.title.clone(),
                    status: Some(ObjectStatus::Parsed),
                    cleaned_text: Some(bookmark_text(entry)),
                    parsed_at: Some(now),
                    ..NewObject::default()
                })
                .await?;
            created.push(object.id);
        }

        // Leave an import receipt in the job's private payload
        self.jobs
            .update(
                job.id,
                JobUpdate {
                    job_specific_data: Some(serde_json::json!({
                        "created_object_ids": created,
                        "duplicates_skipped": duplicates_skipped,
                    })),
                    ..JobUpdate::default()
                },
            )
            .await?;

        // Single-stage job: no embedding handoff holds it open
        self.jobs.mark_as_completed(job.id, None).await?;

        info!(
            job_id = %job.id,
            created = created.len(),
            duplicates_skipped,
            "bookmark batch imported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_data::{
        JobOptions, JobType, SqliteJobRepository, SqliteObjectRepository, run_migrations,
    };
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn harness() -> (
        tempfile::TempDir,
        Arc<dyn JobRepository>,
        Arc<dyn ObjectRepository>,
        BookmarkBatchProcessor,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("bookmarks-test.sqlite3"))
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
        let processor = BookmarkBatchProcessor::new(Arc::clone(&jobs), Arc::clone(&objects));
        (dir, jobs, objects, processor)
    }

    fn payload(entries: serde_json::Value) -> JobOptions {
        JobOptions {
            job_specific_data: Some(serde_json::json!({ "bookmarks": entries })),
            ..JobOptions::default()
        }
    }

    #[tokio::test]
    async fn imports_bookmarks_as_parsed_objects() {
        let (_dir, jobs, objects, processor) = harness().await;

        let job = jobs
            .create(
                JobType::BookmarkBatch,
                "firefox-export",
                payload(serde_json::json!([
                    { "url": "https://a.example", "title": "A", "folder": "Reading" },
                    { "url": "https://b.example" },
                ])),
            )
            .await
            .unwrap();
        jobs.mark_as_started(job.id).await.unwrap();

        processor.process(&job).await.unwrap();

        let job = jobs.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());

        let parsed = objects
            .get_next_by_status(ObjectStatus::Parsed, 10)
            .await
            .unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|o| o.object_type == ObjectType::Bookmark));
        assert!(parsed.iter().all(|o| o
            .cleaned_text
            .as_deref()
            .is_some_and(|t| !t.is_empty())));
    }

    #[tokio::test]
    async fn duplicate_urls_collapse() {
        let (_dir, jobs, objects, processor) = harness().await;

        let job = jobs
            .create(
                JobType::BookmarkBatch,
                "export",
                payload(serde_json::json!([
                    { "url": "https://a.example", "folder": "Work" },
                    { "url": "https://a.example", "folder": "Home" },
                ])),
            )
            .await
            .unwrap();
        jobs.mark_as_started(job.id).await.unwrap();

        processor.process(&job).await.unwrap();

        let parsed = objects
            .get_next_by_status(ObjectStatus::Parsed, 10)
            .await
            .unwrap();
        assert_eq!(parsed.len(), 1);

        let job = jobs.get_by_id(job.id).await.unwrap().unwrap();
        let receipt = job.job_specific_data.unwrap();
        assert_eq!(receipt["duplicates_skipped"], 1);
        assert_eq!(receipt["created_object_ids"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_or_malformed_payload_is_input_fatal() {
        let (_dir, jobs, _objects, processor) = harness().await;

        let no_payload = jobs
            .create(JobType::BookmarkBatch, "export", JobOptions::default())
            .await
            .unwrap();
        jobs.mark_as_started(no_payload.id).await.unwrap();
        let err = processor.process(&no_payload).await.unwrap_err();
        assert!(!err.retryable());

        let empty = jobs
            .create(
                JobType::BookmarkBatch,
                "export",
                payload(serde_json::json!([])),
            )
            .await
            .unwrap();
        jobs.mark_as_started(empty.id).await.unwrap();
        let err = processor.process(&empty).await.unwrap_err();
        assert!(matches!(err, ProcessorError::InputFatal(_)));
    }
}
