//! Correlation IDs for following one unit of pipeline work
//!
//! A correlation ID is minted when the scheduler claims a job and when the
//! embedding worker claims an object, then carried through log fields and
//! lifecycle events so a single ingestion run can be traced across the
//! queue, its processor, and the embedder.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier stamped on one claimed unit of pipeline work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
