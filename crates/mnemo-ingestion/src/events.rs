//! Lifecycle events emitted by the ingestion queue
//!
//! Events are broadcast synchronously from the scheduler's tasks; handlers
//! must not block. `Completed` means the processor finished, not that the
//! job reached a terminal state - multi-stage jobs terminate later, when
//! the embedding worker finishes their object.
//!
//! Events for one processing run (`Started` through `Completed`/`Retry`/
//! `Failed`) share the correlation ID minted at claim time, so an observer
//! can stitch a run together across attempts.

use std::time::Duration;

use uuid::Uuid;

use mnemo_common::CorrelationId;
use mnemo_data::JobType;

/// One observable moment in a job's life
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A job was enqueued
    Created { job_id: Uuid, job_type: JobType },
    /// A job was claimed and its processor is running
    Started {
        job_id: Uuid,
        attempt: i64,
        correlation_id: CorrelationId,
    },
    /// The processor returned without error (not necessarily terminal)
    Completed {
        job_id: Uuid,
        correlation_id: CorrelationId,
    },
    /// The job failed and a retry was scheduled
    Retry {
        job_id: Uuid,
        attempt: i64,
        delay: Duration,
        correlation_id: CorrelationId,
    },
    /// The job failed terminally
    Failed {
        job_id: Uuid,
        error: String,
        correlation_id: CorrelationId,
    },
    /// The job was cancelled before it ran
    Cancelled { job_id: Uuid },
}

impl QueueEvent {
    /// The job this event concerns
    pub const fn job_id(&self) -> Uuid {
        match self {
            Self::Created { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Retry { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id } => *job_id,
        }
    }

    /// The processing run this event belongs to, if it has started
    pub const fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::Started { correlation_id, .. }
            | Self::Completed { correlation_id, .. }
            | Self::Retry { correlation_id, .. }
            | Self::Failed { correlation_id, .. } => Some(*correlation_id),
            Self::Created { .. } | Self::Cancelled { .. } => None,
        }
    }
}
