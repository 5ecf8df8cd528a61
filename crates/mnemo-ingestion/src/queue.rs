//! Priority-aware polling scheduler for ingestion jobs
//!
//! Claims runnable jobs from the persistent queue, dispatches them to
//! type-registered processors under a concurrency bound, applies
//! exponential-backoff retries, and broadcasts lifecycle events. One
//! instance per process; a second instance sharing the store is kept
//! honest by the conditional claim in the repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{IngestResult, ProcessorError};
use crate::events::QueueEvent;
use crate::processors::JobProcessor;
use mnemo_common::CorrelationId;
use mnemo_config::QueueConfig;
use mnemo_data::{IngestionJob, JobOptions, JobRepository, JobStatus, JobType};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Caps the backoff exponent so the delay multiplication cannot overflow
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Recover a guard from a poisoned lock; the maps hold no invariants a
/// panicked task could have broken mid-update
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded-concurrency ingestion scheduler
pub struct IngestionQueue {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: Arc<dyn JobRepository>,
    config: QueueConfig,
    processors: RwLock<HashMap<JobType, Arc<dyn JobProcessor>>>,
    /// In-flight tasks keyed by job ID; touched only under the lock
    active: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    running: AtomicBool,
    poll_nudge: Notify,
    events: broadcast::Sender<QueueEvent>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionQueue {
    /// Create a stopped queue over the given repository
    pub fn new(jobs: Arc<dyn JobRepository>, config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                jobs,
                config,
                processors: RwLock::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                poll_nudge: Notify::new(),
                events,
                scheduler: Mutex::new(None),
            }),
        }
    }

    /// Install the handler for a job type, replacing any prior registration
    pub fn register_processor(&self, job_type: JobType, processor: Arc<dyn JobProcessor>) {
        let mut processors = self
            .inner
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        processors.insert(job_type, processor);
    }

    /// Subscribe to lifecycle events
    ///
    /// Handlers run synchronously in the emitting task and must not block.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Begin polling; idempotent
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            concurrency = self.inner.config.concurrency,
            poll_interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            "ingestion queue started"
        );
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(scheduler_loop(inner));
        *lock(&self.inner.scheduler) = Some(handle);
    }

    /// Stop accepting work and wait for in-flight processors to finish
    ///
    /// Cooperative only: running processors are never interrupted.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping ingestion queue");
        // notify_one stores a permit, so the scheduler wakes even if it is
        // mid-poll rather than parked in the select
        self.inner.poll_nudge.notify_one();

        let scheduler = lock(&self.inner.scheduler).take();
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task panicked");
            }
        }

        loop {
            let drained: Vec<(Uuid, JoinHandle<()>)> = lock(&self.inner.active).drain().collect();
            if drained.is_empty() {
                break;
            }
            for (job_id, handle) in drained {
                if let Err(e) = handle.await {
                    error!(job_id = %job_id, error = %e, "job task panicked");
                }
            }
        }

        info!("ingestion queue stopped");
    }

    /// Whether the queue is accepting work
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Enqueue a job; schedules an immediate poll when running
    ///
    /// # Errors
    ///
    /// Surfaces the repository insert failure unchanged.
    pub async fn add_job(
        &self,
        job_type: JobType,
        source_identifier: &str,
        options: JobOptions,
    ) -> IngestResult<IngestionJob> {
        let job = self
            .inner
            .jobs
            .create(job_type, source_identifier, options)
            .await?;

        self.inner.emit(QueueEvent::Created {
            job_id: job.id,
            job_type,
        });

        if self.is_running() {
            self.inner.poll_nudge.notify_one();
        }

        Ok(job)
    }

    /// Cancel a job that is not actively processing
    ///
    /// Returns `false` for active jobs and jobs already terminal.
    ///
    /// # Errors
    ///
    /// Surfaces repository failures unchanged.
    pub async fn cancel_job(&self, id: Uuid) -> IngestResult<bool> {
        if lock(&self.inner.active).contains_key(&id) {
            return Ok(false);
        }

        let cancelled = self.inner.jobs.mark_as_cancelled(id).await?;
        if cancelled {
            self.inner.emit(QueueEvent::Cancelled { job_id: id });
        }
        Ok(cancelled)
    }

    /// Return a `failed` or `retry_pending` job to the queue
    ///
    /// Clears its error fields and makes it immediately runnable.
    ///
    /// # Errors
    ///
    /// Surfaces repository failures unchanged.
    pub async fn retry_job(&self, id: Uuid) -> IngestResult<bool> {
        let requeued = self.inner.jobs.requeue(id).await?;
        if requeued && self.is_running() {
            self.inner.poll_nudge.notify_one();
        }
        Ok(requeued)
    }

    /// Count jobs per status
    ///
    /// # Errors
    ///
    /// Surfaces repository failures unchanged.
    pub async fn get_stats(&self) -> IngestResult<HashMap<JobStatus, i64>> {
        Ok(self.inner.jobs.get_stats().await?)
    }

    /// Number of jobs currently executing
    pub fn active_job_count(&self) -> usize {
        lock(&self.inner.active).len()
    }

    /// Delete terminal jobs older than `days`
    ///
    /// # Errors
    ///
    /// Surfaces repository failures unchanged.
    pub async fn cleanup_old_jobs(&self, days: u32) -> IngestResult<u64> {
        Ok(self.inner.jobs.cleanup_old_jobs(days).await?)
    }

    /// Run one poll iteration immediately
    ///
    /// Exposed so tests can drive the scheduler deterministically without
    /// waiting on the poll timer. Requires the queue to be running.
    pub async fn poll_once(&self) {
        self.inner.poll().await;
    }
}

/// Poll, then sleep until the interval elapses or a nudge arrives
async fn scheduler_loop(inner: Arc<Inner>) {
    while inner.running.load(Ordering::SeqCst) {
        inner.poll().await;

        tokio::select! {
            () = tokio::time::sleep(inner.config.poll_interval) => {}
            () = inner.poll_nudge.notified() => {}
        }
    }
    debug!("scheduler loop exited");
}

impl Inner {
    fn emit(&self, event: QueueEvent) {
        // A send error only means no subscribers
        let _ = self.events.send(event);
    }

    fn remove_active(&self, job_id: Uuid) {
        lock(&self.active).remove(&job_id);
    }

    async fn poll(self: &Arc<Self>) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        // Prune finished tasks so a panicked processor cannot hold a slot
        let active_count = {
            let mut active = lock(&self.active);
            active.retain(|_, handle| !handle.is_finished());
            active.len()
        };

        let slots = self.config.concurrency.saturating_sub(active_count);
        if slots == 0 {
            return;
        }

        let registered: Vec<JobType> = {
            let processors = self
                .processors
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            processors.keys().copied().collect()
        };
        if registered.is_empty() {
            return;
        }

        let batch = match self.jobs.get_next_jobs(slots, &registered).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to read runnable jobs");
                return;
            }
        };

        for job in batch {
            let processor = {
                let processors = self
                    .processors
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                processors.get(&job.job_type).cloned()
            };

            // Registration cannot be assumed between the read and now; a
            // job without a handler is a programmer error and fails
            // terminally
            let Some(processor) = processor else {
                let correlation_id = CorrelationId::new();
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    correlation_id = %correlation_id,
                    "no processor registered"
                );
                if let Err(e) = self
                    .jobs
                    .mark_as_failed(
                        job.id,
                        &format!("no processor registered for job type '{}'", job.job_type),
                        Some("processing_source"),
                    )
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to mark job failed");
                }
                self.emit(QueueEvent::Failed {
                    job_id: job.id,
                    error: "no processor registered".to_string(),
                    correlation_id,
                });
                continue;
            };

            let mut active = lock(&self.active);
            if active.len() >= self.config.concurrency {
                break;
            }
            if active.contains_key(&job.id) {
                continue;
            }

            let job_id = job.id;
            let inner = Arc::clone(self);
            let handle = tokio::spawn(run_job(inner, job, processor));
            active.insert(job_id, handle);
        }
    }

    async fn handle_failure(
        &self,
        job: &IngestionJob,
        error: &ProcessorError,
        correlation_id: CorrelationId,
    ) {
        let attempt = job.attempts;
        let failed_stage = self.infer_failed_stage(job.id).await;
        let message = error.to_string();

        let within_budget = attempt <= i64::from(self.config.max_retries);
        if error.retryable() && within_budget {
            let exponent = u32::try_from(attempt.saturating_sub(1))
                .unwrap_or(0)
                .min(MAX_BACKOFF_EXPONENT);
            let delay = self.config.retry_delay.saturating_mul(2_u32.pow(exponent));

            warn!(
                job_id = %job.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                correlation_id = %correlation_id,
                error = %message,
                "job failed, retry scheduled"
            );
            if let Err(e) = self
                .jobs
                .mark_as_retryable(job.id, &message, failed_stage.as_deref(), delay)
                .await
            {
                error!(job_id = %job.id, error = %e, "failed to schedule retry");
            }
            self.emit(QueueEvent::Retry {
                job_id: job.id,
                attempt,
                delay,
                correlation_id,
            });
        } else {
            error!(
                job_id = %job.id,
                correlation_id = %correlation_id,
                error = %message,
                "job failed permanently after {attempt} attempts"
            );
            if let Err(e) = self
                .jobs
                .mark_as_failed(job.id, &message, failed_stage.as_deref())
                .await
            {
                error!(job_id = %job.id, error = %e, "failed to mark job failed");
            }
            self.emit(QueueEvent::Failed {
                job_id: job.id,
                error: message,
                correlation_id,
            });
        }
    }

    /// Infer which progress substate was current when the failure happened
    ///
    /// Relies on processors advancing the job row through substates; falls
    /// back to `processing_source` when the row never left the claim state.
    async fn infer_failed_stage(&self, job_id: Uuid) -> Option<String> {
        match self.jobs.get_by_id(job_id).await {
            Ok(Some(job)) if job.status.is_active() => Some(job.status.to_string()),
            Ok(_) => Some(JobStatus::ProcessingSource.to_string()),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "could not infer failed stage");
                None
            }
        }
    }
}

/// Claim, process, and finalize one job, then release its slot
async fn run_job(inner: Arc<Inner>, mut job: IngestionJob, processor: Arc<dyn JobProcessor>) {
    let job_id = job.id;

    let claimed = match inner.jobs.mark_as_started(job_id).await {
        Ok(claimed) => claimed,
        Err(e) => {
            error!(job_id = %job_id, error = %e, "claim failed");
            inner.remove_active(job_id);
            return;
        }
    };
    if !claimed {
        // Another instance sharing the store won the claim
        debug!(job_id = %job_id, "claim lost, abandoning job");
        inner.remove_active(job_id);
        return;
    }

    job.attempts = job.attempts.saturating_add(1);
    job.status = JobStatus::ProcessingSource;

    // One correlation ID per claim; retries mint a fresh one
    let correlation_id = CorrelationId::new();

    inner.emit(QueueEvent::Started {
        job_id,
        attempt: job.attempts,
        correlation_id,
    });
    info!(
        job_id = %job_id,
        job_type = %job.job_type,
        attempt = job.attempts,
        correlation_id = %correlation_id,
        "processing job"
    );

    match processor.process(&job).await {
        Ok(()) => {
            // Terminal transition is owned by the processor (single-stage
            // jobs) or by the embedding worker (multi-stage jobs); the
            // scheduler only reports that the processor finished
            debug!(job_id = %job_id, correlation_id = %correlation_id, "processor finished");
            inner.emit(QueueEvent::Completed {
                job_id,
                correlation_id,
            });
        }
        Err(e) => inner.handle_failure(&job, &e, correlation_id).await,
    }

    inner.remove_active(job_id);
}
