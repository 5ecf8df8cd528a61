//! Mock implementation of `VectorStore` for testing
//!
//! Stores documents in memory with configurable failure modes, useful for
//! unit tests and development without a real vector backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{VectorDataError, VectorDataResult};
use crate::traits::VectorStore;
use crate::types::{ScoredDocument, SearchFilter, VectorDocument};

// Type alias to simplify the shared store
type DocumentStore = Arc<Mutex<Vec<(String, VectorDocument)>>>;

/// Mock vector store for testing
#[derive(Clone, Default)]
pub struct MockVectorStore {
    documents: DocumentStore,
    fail_on_add: bool,
    /// Return this many fewer IDs than documents (reconciliation testing)
    short_ids_by: usize,
}

impl MockVectorStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure to fail on add operations (for testing error handling)
    #[must_use]
    pub fn with_add_failure(mut self) -> Self {
        self.fail_on_add = true;
        self
    }

    /// Configure to return `n` fewer IDs than documents submitted
    ///
    /// Models a best-effort backend that silently drops writes, which the
    /// embedding worker must detect as a count mismatch.
    #[must_use]
    pub fn with_short_ids(mut self, n: usize) -> Self {
        self.short_ids_by = n;
        self
    }

    /// Number of documents currently stored (for test assertions)
    pub fn document_count(&self) -> usize {
        self.documents.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    /// Stored documents with their IDs (for test assertions)
    pub fn stored_documents(&self) -> Vec<(String, VectorDocument)> {
        self.documents
            .lock()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn add_documents(&self, docs: &[VectorDocument]) -> VectorDataResult<Vec<String>> {
        if self.fail_on_add {
            return Err(VectorDataError::StoreUnavailable(
                "mock store configured to fail".into(),
            ));
        }

        let mut stored = self
            .documents
            .lock()
            .map_err(|e| VectorDataError::Other(format!("lock poisoned: {e}")))?;

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            stored.push((id.clone(), doc.clone()));
            ids.push(id);
        }

        // A short backend stores everything but acknowledges less
        ids.truncate(docs.len().saturating_sub(self.short_ids_by));
        Ok(ids)
    }

    async fn query_similar_by_text(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> VectorDataResult<Vec<ScoredDocument>> {
        let stored = self
            .documents
            .lock()
            .map_err(|e| VectorDataError::Other(format!("lock poisoned: {e}")))?;

        tracing::debug!(query, stored = stored.len(), "mock similarity query");

        // Mock ranking: insertion order with decreasing scores
        let results = stored
            .iter()
            .filter(|(_, doc)| {
                filter.is_none_or(|f| {
                    f.object_id
                        .is_none_or(|object_id| doc.metadata.object_id == object_id)
                        && f.tags.iter().all(|tag| doc.metadata.tags.contains(tag))
                })
            })
            .take(k)
            .enumerate()
            .map(|(i, (_, doc))| ScoredDocument {
                document: doc.clone(),
                score: 1.0 - (i as f32 * 0.1),
            })
            .collect();

        Ok(results)
    }

    async fn delete_documents_by_ids(&self, ids: &[String]) -> VectorDataResult<()> {
        if !ids.is_empty() {
            let mut stored = self
                .documents
                .lock()
                .map_err(|e| VectorDataError::Other(format!("lock poisoned: {e}")))?;
            stored.retain(|(id, _)| !ids.contains(id));
        }
        Ok(())
    }
}
