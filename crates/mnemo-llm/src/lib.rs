//! Language-model interface for the mnemo ingestion pipeline
//!
//! Semantic chunking and document profiling contracts, plus a scripted
//! mock. The real client is an external collaborator injected at
//! composition time.

pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use error::{LlmError, LlmResult};
pub use mock::MockChunkingClient;
pub use traits::ChunkingClient;
pub use types::{ChunkDescriptor, DocumentProfile};
