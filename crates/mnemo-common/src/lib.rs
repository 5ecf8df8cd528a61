//! Shared utilities for the mnemo workspace
//!
//! Small, dependency-light building blocks used by every other crate:
//! correlation IDs for tracing one ingestion run across the queue and the
//! embedder, bounded diagnostic truncation, and env initialization.

pub mod error;
pub mod init;
pub mod tracing;

pub use error::truncate_error;
pub use init::initialize_environment;
pub use tracing::CorrelationId;

/// Maximum number of characters persisted for any stored error message.
///
/// Diagnostic strings written to `error_info` columns are clipped to this
/// bound so a pathological upstream error cannot bloat the database.
pub const MAX_ERROR_INFO_CHARS: usize = 1000;
