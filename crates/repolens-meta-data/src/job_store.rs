//! Durable job store - the single source of truth for the scheduler
//!
//! Every state transition goes through `save`, a full-record
//! compare-and-write keyed by job ID and expected status, so two workers
//! (or two scheduler processes sharing one store) can never clobber each
//! other's transition.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{MetaDataError, MetaDataErrorExt, MetaDataResult};
use crate::models::{IngestionJob, JobStatus, QueueStats};

/// Durable record of ingestion jobs and their state
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a new job in `Pending` state
    async fn enqueue(
        &self,
        repository_locator: &str,
        priority: i32,
        max_attempts: i32,
    ) -> MetaDataResult<IngestionJob>;

    /// Look up a job by its externally-correlatable processing ID
    async fn get(&self, processing_id: &Uuid) -> MetaDataResult<Option<IngestionJob>>;

    /// Look up a job by its internal job ID
    async fn get_by_job_id(&self, job_id: &Uuid) -> MetaDataResult<Option<IngestionJob>>;

    /// Next eligible jobs: `Pending`, or `Retrying` whose backoff window
    /// has elapsed, ordered by `priority DESC, created_at ASC`
    async fn next_batch(&self, limit: usize) -> MetaDataResult<Vec<IngestionJob>>;

    /// Persist a full state transition atomically
    ///
    /// Fails with `MetaDataError::Conflict` when the stored status no
    /// longer equals `expected` (another owner won the transition).
    async fn save(&self, job: &IngestionJob, expected: JobStatus) -> MetaDataResult<()>;

    /// Most recent jobs, newest first
    async fn list_jobs(&self, limit: i64) -> MetaDataResult<Vec<IngestionJob>>;

    /// Job counts per status
    async fn queue_stats(&self) -> MetaDataResult<QueueStats>;
}

/// `PostgreSQL` implementation of the job store
#[derive(Clone)]
pub struct DbJobStore {
    pool: PgPool,
    retry_backoff: Duration,
}

impl DbJobStore {
    /// `retry_backoff` is the linear backoff unit: a `Retrying` job becomes
    /// eligible `attempts * retry_backoff` after its last transition.
    pub const fn new(pool: PgPool, retry_backoff: Duration) -> Self {
        Self {
            pool,
            retry_backoff,
        }
    }
}

fn job_from_row(row: &PgRow) -> Result<IngestionJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    // A corrupted status must not decode to some valid state; a terminal
    // row resurrected as Pending would be re-dispatched.
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;
    Ok(IngestionJob {
        job_id: row.try_get("job_id")?,
        processing_id: row.try_get("processing_id")?,
        repository_locator: row.try_get("repository_locator")?,
        status,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        priority: row.try_get("priority")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_error: row.try_get("last_error")?,
    })
}

const JOB_COLUMNS: &str = "job_id, processing_id, repository_locator, status, attempts, \
     max_attempts, priority, created_at, updated_at, started_at, completed_at, last_error";

#[async_trait]
impl JobStore for DbJobStore {
    async fn enqueue(
        &self,
        repository_locator: &str,
        priority: i32,
        max_attempts: i32,
    ) -> MetaDataResult<IngestionJob> {
        let now = Utc::now();
        let job = IngestionJob {
            job_id: Uuid::new_v4(),
            processing_id: Uuid::new_v4(),
            repository_locator: repository_locator.to_string(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            priority,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            last_error: None,
        };

        sqlx::query(
            r"
            INSERT INTO ingestion_jobs
                (job_id, processing_id, repository_locator, status, attempts,
                 max_attempts, priority, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(job.job_id)
        .bind(job.processing_id)
        .bind(&job.repository_locator)
        .bind(job.status.to_string())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.priority)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_db_err("enqueue")?;

        Ok(job)
    }

    async fn get(&self, processing_id: &Uuid) -> MetaDataResult<Option<IngestionJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE processing_id = $1"
        ))
        .bind(processing_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("get")?;

        row.as_ref()
            .map(job_from_row)
            .transpose()
            .map_db_err("get")
    }

    async fn get_by_job_id(&self, job_id: &Uuid) -> MetaDataResult<Option<IngestionJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("get_by_job_id")?;

        row.as_ref()
            .map(job_from_row)
            .transpose()
            .map_db_err("get_by_job_id")
    }

    async fn next_batch(&self, limit: usize) -> MetaDataResult<Vec<IngestionJob>> {
        let now = Utc::now();
        let backoff_secs = self.retry_backoff.as_secs_f64();

        // A retrying job is eligible only once attempts * backoff has
        // elapsed since its last transition.
        let rows = sqlx::query(&format!(
            r"
            SELECT {JOB_COLUMNS}
            FROM ingestion_jobs
            WHERE status = 'pending'
               OR (status = 'retrying'
                   AND updated_at + make_interval(secs => $1 * attempts) <= $2)
            ORDER BY priority DESC, created_at ASC
            LIMIT $3
            "
        ))
        .bind(backoff_secs)
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_db_err("next_batch")?;

        rows.iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_db_err("next_batch")
    }

    async fn save(&self, job: &IngestionJob, expected: JobStatus) -> MetaDataResult<()> {
        let result = sqlx::query(
            r"
            UPDATE ingestion_jobs
            SET status = $1,
                attempts = $2,
                started_at = $3,
                completed_at = $4,
                last_error = $5,
                updated_at = $6
            WHERE job_id = $7
              AND status = $8
            ",
        )
        .bind(job.status.to_string())
        .bind(job.attempts)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.last_error)
        .bind(job.updated_at)
        .bind(job.job_id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_db_err("save")?;

        if result.rows_affected() == 0 {
            return Err(MetaDataError::Conflict {
                job_id: job.job_id,
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    async fn list_jobs(&self, limit: i64) -> MetaDataResult<Vec<IngestionJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_db_err("list_jobs")?;

        rows.iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_db_err("list_jobs")
    }

    async fn queue_stats(&self) -> MetaDataResult<QueueStats> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'processing') as processing,
                COUNT(*) FILTER (WHERE status = 'retrying') as retrying,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM ingestion_jobs
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_db_err("queue_stats")?;

        Ok(QueueStats {
            pending: row.try_get("pending").unwrap_or(0),
            processing: row.try_get("processing").unwrap_or(0),
            retrying: row.try_get("retrying").unwrap_or(0),
            completed: row.try_get("completed").unwrap_or(0),
            failed: row.try_get("failed").unwrap_or(0),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::mock::MockJobStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn enqueue_creates_pending_job() {
        let store = MockJobStore::new(Duration::from_secs(30));
        let job = store.enqueue("https://git.example.com/a.git", 5, 3).await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.priority, 5);
        assert!(store.get(&job.processing_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn next_batch_orders_by_priority_then_age() {
        let store = MockJobStore::new(Duration::from_secs(30));
        let low = store.enqueue("repo-low", 1, 3).await.unwrap();
        let high = store.enqueue("repo-high", 10, 3).await.unwrap();

        let batch = store.next_batch(10).await.unwrap();
        assert_eq!(batch[0].job_id, high.job_id);
        assert_eq!(batch[1].job_id, low.job_id);
    }

    #[tokio::test]
    async fn next_batch_respects_backoff_window() {
        let store = MockJobStore::new(Duration::from_secs(60));
        let job = store.enqueue("repo", 0, 3).await.unwrap();

        // Move the job into a fresh retrying state: not yet eligible.
        let mut retrying = job.clone();
        retrying.status = JobStatus::Retrying;
        retrying.attempts = 1;
        retrying.updated_at = Utc::now();
        store.save(&retrying, JobStatus::Pending).await.unwrap();

        assert!(store.next_batch(10).await.unwrap().is_empty());

        // Backdate the transition past the window: eligible again.
        let mut aged = retrying.clone();
        aged.updated_at = Utc::now() - ChronoDuration::seconds(61);
        store.save(&aged, JobStatus::Retrying).await.unwrap();

        let batch = store.next_batch(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].job_id, job.job_id);
    }

    #[tokio::test]
    async fn save_rejects_lost_updates() {
        let store = MockJobStore::new(Duration::from_secs(30));
        let job = store.enqueue("repo", 0, 3).await.unwrap();

        let mut claimed = job.clone();
        claimed.status = JobStatus::Processing;
        claimed.attempts = 1;
        store.save(&claimed, JobStatus::Pending).await.unwrap();

        // A second claimant still expecting Pending must lose.
        let mut stale = job.clone();
        stale.status = JobStatus::Processing;
        stale.attempts = 1;
        let err = store.save(&stale, JobStatus::Pending).await.unwrap_err();
        assert!(matches!(err, MetaDataError::Conflict { .. }));
    }

    #[tokio::test]
    async fn terminal_jobs_never_match_non_terminal_expectations() {
        let store = MockJobStore::new(Duration::from_secs(30));
        let job = store.enqueue("repo", 0, 3).await.unwrap();

        let mut done = job.clone();
        done.status = JobStatus::Completed;
        done.completed_at = Some(Utc::now());
        store.save(&done, JobStatus::Pending).await.unwrap();

        // Any further transition expecting an active state fails.
        let mut zombie = done.clone();
        zombie.status = JobStatus::Processing;
        assert!(store.save(&zombie, JobStatus::Processing).await.is_err());
        assert!(store.save(&zombie, JobStatus::Pending).await.is_err());
    }

    #[tokio::test]
    async fn queue_stats_counts_statuses() {
        let store = MockJobStore::new(Duration::from_secs(30));
        store.enqueue("a", 0, 3).await.unwrap();
        let b = store.enqueue("b", 0, 3).await.unwrap();

        let mut failed = b.clone();
        failed.status = JobStatus::Failed;
        failed.last_error = Some("unreachable".to_string());
        store.save(&failed, JobStatus::Pending).await.unwrap();

        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);
    }
}
