//! Mock implementation of `ChunkingClient` for testing
//!
//! Chunks by sentence with optional scripted outputs and failure
//! injection; call counts are tracked for assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{LlmError, LlmResult};
use crate::traits::ChunkingClient;
use crate::types::{ChunkDescriptor, DocumentProfile};

/// Mock chunking client for testing
#[derive(Clone, Default)]
pub struct MockChunkingClient {
    scripted_chunks: Arc<Mutex<Option<Vec<ChunkDescriptor>>>>,
    fail_on_chunk: bool,
    return_empty: bool,
    chunk_calls: Arc<AtomicUsize>,
    profile_calls: Arc<AtomicUsize>,
}

impl MockChunkingClient {
    /// Create a mock that chunks text by sentence
    pub fn new() -> Self {
        Self::default()
    }

    /// Return exactly these chunks on every `chunk_text` call
    #[must_use]
    pub fn with_scripted_chunks(self, chunks: Vec<ChunkDescriptor>) -> Self {
        if let Ok(mut scripted) = self.scripted_chunks.lock() {
            *scripted = Some(chunks);
        }
        self
    }

    /// Configure `chunk_text` to fail (for testing error handling)
    #[must_use]
    pub fn with_chunk_failure(mut self) -> Self {
        self.fail_on_chunk = true;
        self
    }

    /// Configure `chunk_text` to return an empty list (semantic failure)
    #[must_use]
    pub fn with_empty_chunks(mut self) -> Self {
        self.return_empty = true;
        self
    }

    /// Number of `chunk_text` calls observed
    pub fn chunk_call_count(&self) -> usize {
        self.chunk_calls.load(Ordering::Relaxed)
    }

    /// Number of `profile_document` calls observed
    pub fn profile_call_count(&self) -> usize {
        self.profile_calls.load(Ordering::Relaxed)
    }
}

/// Split text into sentence-shaped chunks
fn sentence_chunks(text: &str) -> Vec<ChunkDescriptor> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let sentence = current.trim();
            if !sentence.is_empty() {
                chunks.push(ChunkDescriptor {
                    content: sentence.to_string(),
                    ..ChunkDescriptor::default()
                });
            }
            current.clear();
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        chunks.push(ChunkDescriptor {
            content: tail.to_string(),
            ..ChunkDescriptor::default()
        });
    }

    chunks
}

#[async_trait]
impl ChunkingClient for MockChunkingClient {
    async fn chunk_text(
        &self,
        cleaned_text: &str,
        object_id: Uuid,
    ) -> LlmResult<Vec<ChunkDescriptor>> {
        self.chunk_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_on_chunk {
            return Err(LlmError::ProviderUnavailable(
                "mock client configured to fail".into(),
            ));
        }
        if self.return_empty {
            return Ok(Vec::new());
        }

        tracing::debug!(%object_id, "mock chunking");

        if let Ok(scripted) = self.scripted_chunks.lock() {
            if let Some(chunks) = scripted.as_ref() {
                return Ok(chunks.clone());
            }
        }

        Ok(sentence_chunks(cleaned_text))
    }

    async fn profile_document(
        &self,
        text: &str,
        source_hint: Option<&str>,
    ) -> LlmResult<DocumentProfile> {
        self.profile_calls.fetch_add(1, Ordering::Relaxed);

        let first_sentence = text
            .split_inclusive(['.', '!', '?'])
            .next()
            .unwrap_or(text)
            .trim();

        Ok(DocumentProfile {
            title: source_hint.map(String::from),
            summary: Some(first_sentence.to_string()),
            tags: vec!["mock".to_string()],
            propositions: Vec::new(),
        })
    }
}
