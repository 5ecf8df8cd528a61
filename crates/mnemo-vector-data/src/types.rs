//! Document types exchanged with the vector store

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every stored document
///
/// Carries enough context that search results are complete without an
/// additional relational lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Relational chunk row this vector represents
    pub chunk_id: i64,
    /// Parent object
    pub object_id: Uuid,
    /// Position of the chunk within its object
    pub chunk_idx: i64,
    /// Object title, if known
    pub title: Option<String>,
    /// Normalized source URL or filename
    pub source_uri: Option<String>,
    /// Chunk-level tags
    pub tags: Vec<String>,
    /// Chunk-level propositions
    pub propositions: Vec<String>,
}

/// One document submitted for embedding and storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Caller-supplied ID; the store generates one when absent
    pub id: Option<String>,
    /// Text to embed
    pub content: String,
    /// Relational context
    pub metadata: DocumentMetadata,
}

/// Optional constraints on a similarity query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Restrict results to one object
    pub object_id: Option<Uuid>,
    /// Require all of these tags
    pub tags: Vec<String>,
}

/// A document returned from a similarity query with its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: VectorDocument,
    pub score: f32,
}
