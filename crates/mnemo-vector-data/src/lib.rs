//! Vector store interface for the mnemo ingestion pipeline
//!
//! Defines the contract the embedding worker relies on - one opaque,
//! globally-unique ID per stored document - plus an in-memory mock with
//! failure injection. Real backends are external collaborators wired in at
//! composition time.

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{VectorDataError, VectorDataResult};
pub use mock::MockVectorStore;
pub use traits::VectorStore;
pub use types::{DocumentMetadata, ScoredDocument, SearchFilter, VectorDocument};
