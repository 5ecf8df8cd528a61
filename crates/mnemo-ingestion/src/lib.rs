//! Coordination machinery for the mnemo ingestion pipeline
//!
//! Three tightly coupled pieces:
//! - [`queue::IngestionQueue`]: persistent, priority-ordered job scheduler
//!   with bounded concurrency, exponential-backoff retries, and lifecycle
//!   events
//! - [`processors`]: per-type workers (URL, PDF, bookmark batch) that
//!   advance content objects to `parsed`
//! - [`embedder::EmbeddingWorker`]: single-worker loop that chunks,
//!   vectorizes, and links parsed objects
//!
//! Jobs survive process restarts in the relational store; objects move
//! through a status-driven lifecycle guarded by compare-and-set
//! transitions.

pub mod embedder;
pub mod error;
pub mod events;
pub mod fetch;
pub mod processors;
pub mod queue;

pub use embedder::EmbeddingWorker;
pub use error::{FetchError, IngestError, IngestResult, ProcessorError};
pub use events::QueueEvent;
pub use fetch::{
    ExtractedText, FetchedPage, MockSourceFetcher, MockTextExtractor, SourceFetcher, TextExtractor,
};
pub use processors::{BookmarkBatchProcessor, JobProcessor, PdfProcessor, UrlProcessor};
pub use queue::IngestionQueue;
