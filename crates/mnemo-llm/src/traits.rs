//! Language-model abstraction consumed by the ingestion pipeline
//!
//! The concrete client (hosted API, local model) is an external
//! collaborator; this trait states only the contract the pipeline needs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::LlmResult;
use crate::types::{ChunkDescriptor, DocumentProfile};

/// Semantic chunking and metadata extraction for one document
#[async_trait]
pub trait ChunkingClient: Send + Sync {
    /// Split cleaned text into semantic chunks
    ///
    /// A successful response is a non-empty list; callers treat an empty
    /// list as a semantic failure of the model, not of the transport.
    async fn chunk_text(
        &self,
        cleaned_text: &str,
        object_id: Uuid,
    ) -> LlmResult<Vec<ChunkDescriptor>>;

    /// Extract object-level title/summary/tags/propositions
    async fn profile_document(
        &self,
        text: &str,
        source_hint: Option<&str>,
    ) -> LlmResult<DocumentProfile>;
}
