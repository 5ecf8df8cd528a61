//! URL ingestion processor
//!
//! Fetches a page, extracts readable text, asks the model for an
//! object-level profile, and persists a `parsed` object. The object is
//! then picked up by the embedding worker; this processor leaves the job
//! in `vectorizing` and never terminates it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::error::ProcessorError;
use crate::fetch::{SourceFetcher, TextExtractor};
use crate::processors::{JobProcessor, advance_stage, to_json_array};
use mnemo_data::{
    IngestionJob, JobRepository, JobStatus, JobUpdate, NewObject, ObjectRepository, ObjectStatus,
    ObjectType,
};
use mnemo_llm::ChunkingClient;

/// Processor for `url` jobs
pub struct UrlProcessor {
    jobs: Arc<dyn JobRepository>,
    objects: Arc<dyn ObjectRepository>,
    llm: Arc<dyn ChunkingClient>,
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn TextExtractor>,
}

impl UrlProcessor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        objects: Arc<dyn ObjectRepository>,
        llm: Arc<dyn ChunkingClient>,
        fetcher: Arc<dyn SourceFetcher>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            jobs,
            objects,
            llm,
            fetcher,
            extractor,
        }
    }
}

#[async_trait]
impl JobProcessor for UrlProcessor {
    async fn process(&self, job: &IngestionJob) -> Result<(), ProcessorError> {
        let url = &job.source_identifier;
        debug!(job_id = %job.id, url, "fetching page");

        let page = self.fetcher.fetch(url).await?;

        advance_stage(&self.jobs, job.id, JobStatus::ParsingContent).await?;
        let extracted = self.extractor.extract_html(&page.body_html)?;
        if extracted.cleaned_text.trim().is_empty() {
            return Err(ProcessorError::InputFatal(format!(
                "page yielded no readable text: {url}"
            )));
        }

        advance_stage(&self.jobs, job.id, JobStatus::AiProcessing).await?;
        let title_hint = extracted.title.as_deref().or(page.title.as_deref());
        let profile = self
            .llm
            .profile_document(&extracted.cleaned_text, title_hint)
            .await?;

        advance_stage(&self.jobs, job.id, JobStatus::PersistingData).await?;
        let now = Utc::now();
        let title = profile
            .title
            .clone()
            .or(extracted.title)
            .or(page.title.clone());

        let object = self
            .objects
            .create(NewObject {
                object_type: Some(ObjectType::Webpage),
                source_uri: Some(page.final_url.clone()),
                title,
                status: Some(ObjectStatus::Parsed),
                cleaned_text: Some(extracted.cleaned_text),
                summary: profile.summary.clone(),
                ai_generated_metadata: serde_json::to_string(&profile).ok(),
                tags_json: to_json_array(&profile.tags),
                propositions_json: to_json_array(&profile.propositions),
                parsed_at: Some(now),
                summary_generated_at: profile.summary.as_ref().map(|_| now),
                ..NewObject::default()
            })
            .await?;

        // Hand off to the embedding worker: the job terminates only after
        // the object reaches `embedded`
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

        info!(job_id = %job.id, object_id = %object.id, url = %page.final_url, "page parsed");
        Ok(())
    }
}
