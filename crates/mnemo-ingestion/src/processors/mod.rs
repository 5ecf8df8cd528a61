//! Per-type job processors
//!
//! One processor per job type, dispatched by the queue from the tag on the
//! job row. A processor returns `Ok` on success and a classified
//! [`ProcessorError`] on failure; the scheduler owns retry accounting.
//!
//! Processors advance the job row through the progress substates
//! (`parsing_content`, `ai_processing`, `persisting_data`, `vectorizing`)
//! as they work; the scheduler reads that status back to record which
//! stage a failure happened in.

mod bookmarks;
mod pdf;
mod url;

pub use bookmarks::BookmarkBatchProcessor;
pub use pdf::PdfProcessor;
pub use url::UrlProcessor;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProcessorError;
use mnemo_data::{IngestionJob, JobRepository, JobStatus, JobUpdate};

/// A fail-or-succeed handler for one job type
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Process one claimed job
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessorError`] classified for the scheduler's retry
    /// policy.
    async fn process(&self, job: &IngestionJob) -> Result<(), ProcessorError>;
}

/// Advance a job's progress substate
pub(crate) async fn advance_stage(
    jobs: &Arc<dyn JobRepository>,
    job_id: Uuid,
    status: JobStatus,
) -> Result<(), ProcessorError> {
    jobs.update(
        job_id,
        JobUpdate {
            status: Some(status),
            ..JobUpdate::default()
        },
    )
    .await?;
    Ok(())
}

/// Serialize a non-empty string list for a `*_json` column
pub(crate) fn to_json_array(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        serde_json::to_string(values).ok()
    }
}
