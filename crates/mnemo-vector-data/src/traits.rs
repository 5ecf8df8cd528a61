//! Storage abstraction trait for vector databases
//!
//! The ingestion pipeline consumes this contract; concrete clients
//! (hosted stores, local indexes) live outside this repository and are
//! injected at composition time.

use crate::VectorDataResult;
use crate::types::{ScoredDocument, SearchFilter, VectorDocument};
use async_trait::async_trait;

/// Trait for vector storage backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store documents
    ///
    /// Must return exactly one globally-unique ID per document, in input
    /// order. Implementations may honor caller-supplied IDs; when a
    /// document carries none, the store generates one.
    async fn add_documents(&self, docs: &[VectorDocument]) -> VectorDataResult<Vec<String>>;

    /// Query for the `k` documents most similar to `query`
    async fn query_similar_by_text(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> VectorDataResult<Vec<ScoredDocument>>;

    /// Delete documents by their IDs; unknown IDs are ignored
    async fn delete_documents_by_ids(&self, ids: &[String]) -> VectorDataResult<()>;
}
