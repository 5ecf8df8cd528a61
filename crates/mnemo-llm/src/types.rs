//! Structured outputs expected from the language model

use serde::{Deserialize, Serialize};

/// One semantic chunk proposed by the model for a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Position hint; callers fall back to positional order when absent
    #[serde(default)]
    pub chunk_idx: Option<i64>,
    /// Chunk text
    pub content: String,
    /// Chunk-level summary
    #[serde(default)]
    pub summary: Option<String>,
    /// Chunk-level tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Atomic factual statements extracted from the chunk
    #[serde(default)]
    pub propositions: Vec<String>,
    /// Token estimate for the chunk text
    #[serde(default)]
    pub token_count: Option<i64>,
}

/// Object-level metadata extracted from a whole document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentProfile {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub propositions: Vec<String>,
}
