//! Job scheduler and worker pool
//!
//! A single poll loop claims eligible jobs through the store's
//! compare-and-write and dispatches them onto a bounded `JoinSet`. The
//! claim is the concurrency token: a job enters `Processing` only after
//! the CAS succeeds, so two pollers sharing one store never run the same
//! job twice. Completion wakes the loop immediately so freed slots refill
//! without waiting out the poll interval.

use async_trait::async_trait;
use chrono::Utc;
use repolens_config::SchedulerSettings;
use repolens_meta_data::{IngestionJob, JobStatus, JobStore, MetaDataError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{IngestionError, IngestionResult};
use crate::pipeline::JobOutcome;

/// Executes one claimed job. Implementations must never panic across this
/// boundary; failures come back as `JobOutcome::Failure`.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &IngestionJob) -> JobOutcome;
}

/// Snapshot returned by `wait_for_completion`
#[derive(Debug, Clone)]
pub struct WaitResult {
    pub job: IngestionJob,
    /// True when the timeout elapsed first; the job keeps running
    pub timed_out: bool,
}

/// Polling scheduler over the durable job store
pub struct Scheduler {
    job_store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    settings: SchedulerSettings,
    shutdown: Arc<AtomicBool>,
    slot_freed: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        runner: Arc<dyn JobRunner>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            job_store,
            runner,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
            slot_freed: Arc::new(Notify::new()),
        }
    }

    /// Handle for graceful shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Main loop. Runs until the shutdown handle is set, then drains
    /// in-flight jobs before returning.
    pub async fn run(&self) {
        info!(
            "Scheduler started (concurrency: {})",
            self.settings.concurrency
        );
        let mut active: JoinSet<()> = JoinSet::new();

        loop {
            while active.try_join_next().is_some() {}

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let free_slots = self.settings.concurrency.saturating_sub(active.len());
            let mut claimed_any = false;

            if free_slots > 0 {
                match self.job_store.next_batch(free_slots).await {
                    Ok(batch) => {
                        for job in batch {
                            if self.claim_and_dispatch(job, &mut active).await {
                                claimed_any = true;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to poll for jobs: {e}");
                    }
                }
            }
            metrics::gauge!("repolens_jobs_active").set(active.len() as f64);

            if !claimed_any {
                tokio::select! {
                    () = self.slot_freed.notified() => {}
                    () = sleep(self.settings.poll_interval()) => {}
                }
            }
        }

        info!("Draining {} in-flight jobs before shutdown", active.len());
        while let Some(result) = active.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Scheduler stopped");
    }

    /// CAS-claim a job and spawn its dispatch. Returns false when another
    /// owner won the claim.
    async fn claim_and_dispatch(&self, job: IngestionJob, active: &mut JoinSet<()>) -> bool {
        let expected = job.status;
        let mut claimed = job;
        claimed.status = JobStatus::Processing;
        claimed.attempts += 1;
        let now = Utc::now();
        claimed.started_at = claimed.started_at.or(Some(now));
        claimed.updated_at = now;

        match self.job_store.save(&claimed, expected).await {
            Ok(()) => {}
            Err(MetaDataError::Conflict { job_id, .. }) => {
                debug!("Job {job_id} claimed elsewhere, skipping");
                return false;
            }
            Err(e) => {
                error!("Failed to claim job {}: {e}", claimed.job_id);
                return false;
            }
        }

        metrics::counter!("repolens_jobs_dispatched").increment(1);
        let runner = Arc::clone(&self.runner);
        let job_store = Arc::clone(&self.job_store);
        let slot_freed = Arc::clone(&self.slot_freed);

        active.spawn(async move {
            let outcome = runner.run(&claimed).await;
            if let Err(e) = persist_outcome(job_store.as_ref(), claimed, outcome).await {
                error!("Failed to persist job outcome: {e}");
            }
            slot_freed.notify_one();
        });
        true
    }

    /// Poll until the job reaches a terminal state or the timeout elapses.
    /// The timeout is advisory: the last snapshot is returned and the job
    /// keeps running.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::JobNotFound` for an unknown processing ID,
    /// or a store error from polling.
    pub async fn wait_for_completion(
        &self,
        processing_id: &Uuid,
        timeout: Duration,
    ) -> IngestionResult<WaitResult> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let job = self
                .job_store
                .get(processing_id)
                .await?
                .ok_or(IngestionError::JobNotFound(*processing_id))?;

            if job.is_terminal() {
                return Ok(WaitResult {
                    job,
                    timed_out: false,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(WaitResult {
                    job,
                    timed_out: true,
                });
            }
            sleep(self.settings.wait_poll_interval()).await;
        }
    }
}

/// Persist the outcome of one attempt through the job store
async fn persist_outcome(
    job_store: &dyn JobStore,
    mut job: IngestionJob,
    outcome: JobOutcome,
) -> IngestionResult<()> {
    let now = Utc::now();
    job.updated_at = now;

    match outcome {
        JobOutcome::Success(report) => {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.last_error = None;
            metrics::counter!("repolens_jobs_completed").increment(1);
            info!(
                processing_id = %job.processing_id,
                attempts = job.attempts,
                files_embedded = report.files_embedded,
                "Job completed"
            );
        }
        JobOutcome::Failure(reason) => {
            job.last_error = Some(reason.clone());
            if job.attempts >= job.max_attempts {
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                metrics::counter!("repolens_jobs_failed").increment(1);
                error!(
                    processing_id = %job.processing_id,
                    attempts = job.attempts,
                    "Job failed permanently: {reason}"
                );
            } else {
                job.status = JobStatus::Retrying;
                metrics::counter!("repolens_jobs_retried").increment(1);
                warn!(
                    processing_id = %job.processing_id,
                    attempts = job.attempts,
                    max_attempts = job.max_attempts,
                    "Job attempt failed, will retry: {reason}"
                );
            }
        }
    }

    save_outcome(job_store, &job).await
}

/// Retries for the outcome save before the attempt's result is lost
const OUTCOME_SAVE_RETRIES: u32 = 3;
/// First retry delay; doubles on each subsequent retry
const OUTCOME_SAVE_BACKOFF: Duration = Duration::from_millis(100);

/// Write the finished attempt's state, retrying transient store failures.
///
/// Without the retry a single failed save would strand the job in
/// `Processing`: never eligible for `next_batch`, never terminal, with
/// the completed work lost.
async fn save_outcome(job_store: &dyn JobStore, job: &IngestionJob) -> IngestionResult<()> {
    let mut delay = OUTCOME_SAVE_BACKOFF;
    let mut attempt: u32 = 0;

    loop {
        match job_store.save(job, JobStatus::Processing).await {
            Ok(()) => return Ok(()),
            // Another owner moved the job; retrying cannot win.
            Err(e @ MetaDataError::Conflict { .. }) => return Err(e.into()),
            Err(e) if attempt < OUTCOME_SAVE_RETRIES => {
                attempt += 1;
                warn!(
                    "Outcome save for job {} failed (attempt {attempt}/{OUTCOME_SAVE_RETRIES}), retrying in {delay:?}: {e}",
                    job.job_id
                );
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
