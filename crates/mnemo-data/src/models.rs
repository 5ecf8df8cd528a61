//! Domain models for database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ingestion work a job represents; selects the processor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Url,
    Pdf,
    BookmarkBatch,
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "pdf" => Ok(Self::Pdf),
            "bookmark_batch" => Ok(Self::BookmarkBatch),
            _ => Err(format!("Invalid job type: {s}")),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Url => "url",
            Self::Pdf => "pdf",
            Self::BookmarkBatch => "bookmark_batch",
        };
        write!(f, "{tag}")
    }
}

/// Status of an ingestion job
///
/// `ProcessingSource` through `Vectorizing` are progress substates a
/// processor may advance through while the scheduler treats the job as
/// active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    ProcessingSource,
    ParsingContent,
    AiProcessing,
    PersistingData,
    Vectorizing,
    Completed,
    Failed,
    RetryPending,
    Cancelled,
}

impl JobStatus {
    /// Terminal states carry a non-null `completed_at`
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Progress substates the scheduler counts as "active"
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::ProcessingSource
                | Self::ParsingContent
                | Self::AiProcessing
                | Self::PersistingData
                | Self::Vectorizing
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing_source" => Ok(Self::ProcessingSource),
            "parsing_content" => Ok(Self::ParsingContent),
            "ai_processing" => Ok(Self::AiProcessing),
            "persisting_data" => Ok(Self::PersistingData),
            "vectorizing" => Ok(Self::Vectorizing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retry_pending" => Ok(Self::RetryPending),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Queued => "queued",
            Self::ProcessingSource => "processing_source",
            Self::ParsingContent => "parsing_content",
            Self::AiProcessing => "ai_processing",
            Self::PersistingData => "persisting_data",
            Self::Vectorizing => "vectorizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RetryPending => "retry_pending",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{status}")
    }
}

/// Kind of content object produced by ingestion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Webpage,
    PdfDocument,
    Bookmark,
}

impl std::str::FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webpage" => Ok(Self::Webpage),
            "pdf_document" => Ok(Self::PdfDocument),
            "bookmark" => Ok(Self::Bookmark),
            _ => Err(format!("Invalid object type: {s}")),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Webpage => "webpage",
            Self::PdfDocument => "pdf_document",
            Self::Bookmark => "bookmark",
        };
        write!(f, "{tag}")
    }
}

/// Lifecycle state of a content object
///
/// Transitions follow `new -> fetched -> parsed -> embedding -> embedded`,
/// with each stage able to drop into its failure state. No skips.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    New,
    Fetched,
    Parsed,
    Embedding,
    Embedded,
    FetchFailed,
    ParseFailed,
    EmbeddingFailed,
    Error,
}

impl ObjectStatus {
    /// Failure states are excluded from fingerprint identity
    pub const fn is_failed(self) -> bool {
        matches!(
            self,
            Self::FetchFailed | Self::ParseFailed | Self::EmbeddingFailed | Self::Error
        )
    }
}

impl std::str::FromStr for ObjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "fetched" => Ok(Self::Fetched),
            "parsed" => Ok(Self::Parsed),
            "embedding" => Ok(Self::Embedding),
            "embedded" => Ok(Self::Embedded),
            "fetch_failed" => Ok(Self::FetchFailed),
            "parse_failed" => Ok(Self::ParseFailed),
            "embedding_failed" => Ok(Self::EmbeddingFailed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid object status: {s}")),
        }
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::New => "new",
            Self::Fetched => "fetched",
            Self::Parsed => "parsed",
            Self::Embedding => "embedding",
            Self::Embedded => "embedded",
            Self::FetchFailed => "fetch_failed",
            Self::ParseFailed => "parse_failed",
            Self::EmbeddingFailed => "embedding_failed",
            Self::Error => "error",
        };
        write!(f, "{status}")
    }
}

/// A persisted unit of ingestion work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub source_identifier: String,
    pub original_file_name: Option<String>,
    pub priority: i64,
    pub status: JobStatus,
    pub attempts: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_info: Option<String>,
    pub failed_stage: Option<String>,
    /// Processor-private JSON payload; opaque at this layer
    pub job_specific_data: Option<serde_json::Value>,
    pub related_object_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional fields accepted when enqueuing a job
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub original_file_name: Option<String>,
    pub priority: Option<i64>,
    pub job_specific_data: Option<serde_json::Value>,
}

/// Partial mutation for an ingestion job row
///
/// Every field is optional; only set fields are written. Used by
/// processors to advance progress substates and attach produced objects.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub priority: Option<i64>,
    pub job_specific_data: Option<serde_json::Value>,
    pub related_object_id: Option<Uuid>,
}

/// The durable representation of one ingested artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeObject {
    pub id: Uuid,
    pub object_type: ObjectType,
    pub source_uri: Option<String>,
    pub file_hash: Option<String>,
    pub original_file_name: Option<String>,
    pub title: Option<String>,
    pub status: ObjectStatus,
    pub cleaned_text: Option<String>,
    pub summary: Option<String>,
    pub parsed_content_json: Option<String>,
    pub ai_generated_metadata: Option<String>,
    pub tags_json: Option<String>,
    pub propositions_json: Option<String>,
    pub error_info: Option<String>,
    pub internal_file_path: Option<String>,
    pub parsed_at: Option<DateTime<Utc>>,
    pub summary_generated_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a content object
#[derive(Debug, Clone, Default)]
pub struct NewObject {
    pub object_type: Option<ObjectType>,
    pub source_uri: Option<String>,
    pub file_hash: Option<String>,
    pub original_file_name: Option<String>,
    pub title: Option<String>,
    pub status: Option<ObjectStatus>,
    pub cleaned_text: Option<String>,
    pub summary: Option<String>,
    pub parsed_content_json: Option<String>,
    pub ai_generated_metadata: Option<String>,
    pub tags_json: Option<String>,
    pub propositions_json: Option<String>,
    pub internal_file_path: Option<String>,
    pub parsed_at: Option<DateTime<Utc>>,
    pub summary_generated_at: Option<DateTime<Utc>>,
}

/// An ordered fragment of a single object, produced by the chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectChunk {
    pub id: i64,
    pub object_id: Uuid,
    pub chunk_idx: i64,
    pub content: String,
    pub summary: Option<String>,
    pub tags_json: Option<String>,
    pub propositions_json: Option<String>,
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a chunk
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    pub chunk_idx: i64,
    pub content: String,
    pub summary: Option<String>,
    pub tags_json: Option<String>,
    pub propositions_json: Option<String>,
    pub token_count: Option<i64>,
}

/// Relational bridge between a chunk and its external vector ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingLink {
    pub id: i64,
    pub chunk_id: i64,
    pub model: String,
    pub vector_id: String,
    pub created_at: DateTime<Utc>,
}
