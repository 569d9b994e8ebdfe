//! Scheduler behavior against the in-memory job store

#![allow(clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use repolens_config::SchedulerSettings;
use repolens_ingestion::scheduler::{JobRunner, Scheduler};
use repolens_ingestion::{IngestionReport, JobOutcome};
use repolens_meta_data::{IngestionJob, JobStatus, JobStore, MockJobStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Runner that records execution order, tracks concurrency, and can be
/// scripted to fail its first N runs.
struct ScriptedRunner {
    delay: Duration,
    failures_remaining: AtomicUsize,
    order: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedRunner {
    fn new(delay: Duration, failures: usize) -> Self {
        Self {
            delay,
            failures_remaining: AtomicUsize::new(failures),
            order: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn order(&self) -> Vec<String> {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, job: &IngestionJob) -> JobOutcome {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.repository_locator.clone());
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            JobOutcome::Failure("scripted failure".to_string())
        } else {
            JobOutcome::Success(IngestionReport {
                source_id: job.repository_locator.clone(),
                revision: "deadbeef".to_string(),
                files_embedded: 1,
                files_skipped: 0,
                records_written: 1,
            })
        }
    }
}

fn settings(concurrency: usize, max_attempts: i32) -> SchedulerSettings {
    SchedulerSettings {
        concurrency,
        poll_interval_ms: 10,
        wait_poll_interval_ms: 10,
        max_attempts,
        retry_backoff_secs: 0,
    }
}

struct Harness {
    store: Arc<MockJobStore>,
    runner: Arc<ScriptedRunner>,
    scheduler: Arc<Scheduler>,
    loop_task: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start(settings: SchedulerSettings, runner: ScriptedRunner) -> Self {
        let store = Arc::new(MockJobStore::new(settings.retry_backoff()));
        let runner = Arc::new(runner);
        let scheduler = Arc::new(Scheduler::new(
            store.clone() as Arc<dyn JobStore>,
            runner.clone() as Arc<dyn JobRunner>,
            settings,
        ));
        let loop_task = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run().await })
        };
        Self {
            store,
            runner,
            scheduler,
            loop_task,
        }
    }

    async fn stop(self) {
        self.scheduler
            .shutdown_handle()
            .store(true, Ordering::SeqCst);
        self.loop_task.await.unwrap();
    }
}

#[tokio::test]
async fn higher_priority_runs_first_under_single_concurrency() {
    let harness = Harness::start(settings(1, 3), ScriptedRunner::new(Duration::from_millis(20), 0));
    let low = harness.store.enqueue("repo-low", 0, 3).await.unwrap();
    let high = harness.store.enqueue("repo-high", 10, 3).await.unwrap();

    for job in [&high, &low] {
        let result = harness
            .scheduler
            .wait_for_completion(&job.processing_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.job.status, JobStatus::Completed);
    }

    assert_eq!(
        harness.runner.order(),
        vec!["repo-high".to_string(), "repo-low".to_string()]
    );
    harness.stop().await;
}

#[tokio::test]
async fn job_recovers_after_two_failures() {
    let harness = Harness::start(settings(1, 3), ScriptedRunner::new(Duration::from_millis(1), 2));
    let job = harness.store.enqueue("repo", 0, 3).await.unwrap();

    let result = harness
        .scheduler
        .wait_for_completion(&job.processing_id, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!result.timed_out);
    assert_eq!(result.job.status, JobStatus::Completed);
    assert_eq!(result.job.attempts, 3);
    assert!(result.job.completed_at.is_some());
    harness.stop().await;
}

#[tokio::test]
async fn attempt_exhaustion_fails_permanently_with_last_error() {
    let harness = Harness::start(
        settings(1, 2),
        ScriptedRunner::new(Duration::from_millis(1), usize::MAX),
    );
    let job = harness.store.enqueue("repo", 0, 2).await.unwrap();

    let result = harness
        .scheduler
        .wait_for_completion(&job.processing_id, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Failed);
    assert_eq!(result.job.attempts, 2);
    assert_eq!(result.job.last_error.as_deref(), Some("scripted failure"));

    // Terminal records stay terminal; nothing re-dispatches them.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let again = harness
        .store
        .get(&job.processing_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.status, JobStatus::Failed);
    assert_eq!(again.attempts, 2);
    harness.stop().await;
}

#[tokio::test]
async fn concurrency_ceiling_is_never_exceeded() {
    let harness = Harness::start(settings(2, 3), ScriptedRunner::new(Duration::from_millis(40), 0));
    let mut jobs = Vec::new();
    for i in 0..6 {
        jobs.push(harness.store.enqueue(&format!("repo-{i}"), 0, 3).await.unwrap());
    }

    for job in &jobs {
        harness
            .scheduler
            .wait_for_completion(&job.processing_id, Duration::from_secs(10))
            .await
            .unwrap();
    }

    assert!(harness.runner.max_active() <= 2);
    assert_eq!(harness.runner.order().len(), 6);
    harness.stop().await;
}

#[tokio::test]
async fn wait_for_completion_timeout_returns_last_snapshot() {
    let harness = Harness::start(
        settings(1, 3),
        ScriptedRunner::new(Duration::from_millis(300), 0),
    );
    let job = harness.store.enqueue("repo", 0, 3).await.unwrap();

    let early = harness
        .scheduler
        .wait_for_completion(&job.processing_id, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(early.timed_out);
    assert!(!early.job.is_terminal());

    // The job kept running and still completes.
    let done = harness
        .scheduler
        .wait_for_completion(&job.processing_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!done.timed_out);
    assert_eq!(done.job.status, JobStatus::Completed);
    harness.stop().await;
}

#[tokio::test]
async fn unknown_processing_id_is_an_error() {
    let harness = Harness::start(settings(1, 3), ScriptedRunner::new(Duration::from_millis(1), 0));
    let missing = uuid::Uuid::new_v4();

    let result = harness
        .scheduler
        .wait_for_completion(&missing, Duration::from_millis(20))
        .await;
    assert!(result.is_err());
    harness.stop().await;
}

#[tokio::test]
async fn transient_save_failure_at_completion_does_not_wedge_the_job() {
    let harness = Harness::start(
        settings(1, 3),
        ScriptedRunner::new(Duration::from_millis(100), 0),
    );
    let job = harness.store.enqueue("repo", 0, 3).await.unwrap();

    // Wait for the claim so the next save is the outcome write, then
    // arm one store failure against it.
    loop {
        let snapshot = harness.store.get(&job.processing_id).await.unwrap().unwrap();
        if snapshot.status == JobStatus::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    harness.store.fail_saves(1);

    let result = harness
        .scheduler
        .wait_for_completion(&job.processing_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(!result.timed_out);
    assert_eq!(result.job.status, JobStatus::Completed);
    harness.stop().await;
}
