//! In-memory store implementations for tests
//!
//! These mirror the Postgres stores' observable behavior (CAS semantics,
//! backoff eligibility, upsert-by-key, ticket expiry) without a database.
//! Each mock can be armed to fail its next call for error-path tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::dedup_store::DedupStore;
use crate::embedding_store::{EmbeddingStore, rank_by_similarity};
use crate::error::{MetaDataError, MetaDataResult};
use crate::job_store::JobStore;
use crate::models::{
    DedupTicket, EmbeddingRecord, IngestionJob, JobStatus, QueueStats, ScoredRecord,
    SourceMetadata, TicketStatus,
};
use crate::source_store::SourceStore;

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(0))
}

/// Shared failure switch so any mock can simulate a store outage
#[derive(Default)]
struct FailureSwitch {
    fail_next: Mutex<bool>,
}

impl FailureSwitch {
    fn check(&self, operation: &str) -> MetaDataResult<()> {
        let mut armed = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *armed {
            *armed = false;
            return Err(MetaDataError::Other(format!(
                "simulated failure in {operation}"
            )));
        }
        Ok(())
    }

    fn arm(&self) {
        *self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
    }
}

/// In-memory job store
pub struct MockJobStore {
    jobs: Mutex<Vec<IngestionJob>>,
    retry_backoff: Duration,
    failure: FailureSwitch,
    save_failures: AtomicUsize,
}

impl MockJobStore {
    #[must_use]
    pub fn new(retry_backoff: Duration) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            retry_backoff,
            failure: FailureSwitch::default(),
            save_failures: AtomicUsize::new(0),
        }
    }

    /// Make the next store call fail
    pub fn fail_next(&self) {
        self.failure.arm();
    }

    /// Make the next `count` calls to `save` fail, leaving every other
    /// operation working
    pub fn fail_saves(&self, count: usize) {
        self.save_failures.store(count, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<IngestionJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    async fn enqueue(
        &self,
        repository_locator: &str,
        priority: i32,
        max_attempts: i32,
    ) -> MetaDataResult<IngestionJob> {
        self.failure.check("enqueue")?;
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
        self.lock().push(job.clone());
        Ok(job)
    }

    async fn get(&self, processing_id: &Uuid) -> MetaDataResult<Option<IngestionJob>> {
        self.failure.check("get")?;
        Ok(self
            .lock()
            .iter()
            .find(|j| j.processing_id == *processing_id)
            .cloned())
    }

    async fn get_by_job_id(&self, job_id: &Uuid) -> MetaDataResult<Option<IngestionJob>> {
        self.failure.check("get_by_job_id")?;
        Ok(self.lock().iter().find(|j| j.job_id == *job_id).cloned())
    }

    async fn next_batch(&self, limit: usize) -> MetaDataResult<Vec<IngestionJob>> {
        self.failure.check("next_batch")?;
        let now = Utc::now();
        let backoff = chrono_duration(self.retry_backoff);

        let mut eligible: Vec<IngestionJob> = self
            .lock()
            .iter()
            .filter(|j| match j.status {
                JobStatus::Pending => true,
                JobStatus::Retrying => j.updated_at + backoff * j.attempts <= now,
                _ => false,
            })
            .cloned()
            .collect();
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn save(&self, job: &IngestionJob, expected: JobStatus) -> MetaDataResult<()> {
        self.failure.check("save")?;
        if self
            .save_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MetaDataError::Other("simulated failure in save".to_string()));
        }
        let mut jobs = self.lock();
        let Some(stored) = jobs
            .iter_mut()
            .find(|j| j.job_id == job.job_id && j.status == expected)
        else {
            return Err(MetaDataError::Conflict {
                job_id: job.job_id,
                expected: expected.to_string(),
            });
        };
        stored.status = job.status;
        stored.attempts = job.attempts;
        stored.started_at = job.started_at;
        stored.completed_at = job.completed_at;
        stored.last_error = job.last_error.clone();
        stored.updated_at = job.updated_at;
        Ok(())
    }

    async fn list_jobs(&self, limit: i64) -> MetaDataResult<Vec<IngestionJob>> {
        self.failure.check("list_jobs")?;
        let mut jobs = self.lock().clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(jobs)
    }

    async fn queue_stats(&self) -> MetaDataResult<QueueStats> {
        self.failure.check("queue_stats")?;
        let mut stats = QueueStats::default();
        for job in self.lock().iter() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

/// In-memory embedding-record store keyed on `(source_id, unit_path)`
#[derive(Default)]
pub struct MockEmbeddingStore {
    records: Mutex<HashMap<(String, String), EmbeddingRecord>>,
    failure: FailureSwitch,
}

impl MockEmbeddingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next store call fail
    pub fn fail_next(&self) {
        self.failure.arm();
    }

    fn snapshot(&self) -> Vec<EmbeddingRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EmbeddingStore for MockEmbeddingStore {
    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> MetaDataResult<()> {
        self.failure.check("upsert_records")?;
        let mut stored = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for record in records {
            stored.insert(
                (record.source_id.clone(), record.unit_path.clone()),
                record.clone(),
            );
        }
        Ok(())
    }

    async fn list_page(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> MetaDataResult<Vec<EmbeddingRecord>> {
        self.failure.check("list_page")?;
        let mut records = self.snapshot();
        records.sort_by_key(|r| r.id);
        let mut page: Vec<EmbeddingRecord> = records
            .into_iter()
            .filter(|r| after.is_none_or(|id| r.id > id))
            .collect();
        page.truncate(limit);
        Ok(page)
    }

    async fn count_all(&self) -> MetaDataResult<u64> {
        self.failure.check("count_all")?;
        Ok(self.snapshot().len() as u64)
    }

    async fn count_by_source(&self) -> MetaDataResult<Vec<(String, u64)>> {
        self.failure.check("count_by_source")?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for record in self.snapshot() {
            *counts.entry(record.source_id).or_default() += 1;
        }
        let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
        counts.sort();
        Ok(counts)
    }

    async fn search_similar(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        limit: usize,
    ) -> MetaDataResult<Vec<ScoredRecord>> {
        self.failure.check("search_similar")?;
        let candidates = self
            .snapshot()
            .into_iter()
            .filter(|r| source_id.is_none_or(|s| r.source_id == s))
            .collect();
        Ok(rank_by_similarity(query, candidates, limit))
    }

    async fn delete_source(&self, source_id: &str) -> MetaDataResult<u64> {
        self.failure.check("delete_source")?;
        let mut stored = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = stored.len();
        stored.retain(|(source, _), _| source != source_id);
        Ok((before - stored.len()) as u64)
    }
}

/// In-memory dedup ticket store
#[derive(Default)]
pub struct MockDedupStore {
    tickets: Mutex<HashMap<String, DedupTicket>>,
    failure: FailureSwitch,
}

impl MockDedupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next store call fail
    pub fn fail_next(&self) {
        self.failure.arm();
    }
}

#[async_trait]
impl DedupStore for MockDedupStore {
    async fn begin(&self, idempotency_key: &str, window: Duration) -> MetaDataResult<Option<Uuid>> {
        self.failure.check("dedup_begin")?;
        let now = Utc::now();
        let mut tickets = self
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = tickets.get(idempotency_key)
            && existing.expires_at > now
        {
            return Ok(None);
        }

        let ticket = DedupTicket {
            ticket_id: Uuid::new_v4(),
            idempotency_key: idempotency_key.to_string(),
            status: TicketStatus::InFlight,
            created_at: now,
            expires_at: now + chrono_duration(window),
        };
        let id = ticket.ticket_id;
        tickets.insert(idempotency_key.to_string(), ticket);
        Ok(Some(id))
    }

    async fn complete(&self, ticket_id: Uuid, retention: Duration) -> MetaDataResult<()> {
        self.failure.check("dedup_complete")?;
        let now = Utc::now();
        let mut tickets = self
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for ticket in tickets.values_mut() {
            if ticket.ticket_id == ticket_id {
                ticket.status = TicketStatus::Completed;
                ticket.expires_at = now + chrono_duration(retention);
            }
        }
        Ok(())
    }

    async fn sweep_expired(&self) -> MetaDataResult<u64> {
        self.failure.check("dedup_sweep")?;
        let now = Utc::now();
        let mut tickets = self
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = tickets.len();
        tickets.retain(|_, t| t.expires_at > now);
        Ok((before - tickets.len()) as u64)
    }
}

/// In-memory source metadata store
#[derive(Default)]
pub struct MockSourceStore {
    sources: Mutex<HashMap<String, SourceMetadata>>,
    failure: FailureSwitch,
}

impl MockSourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next store call fail
    pub fn fail_next(&self) {
        self.failure.arm();
    }
}

#[async_trait]
impl SourceStore for MockSourceStore {
    async fn get(&self, source_id: &str) -> MetaDataResult<Option<SourceMetadata>> {
        self.failure.check("source_get")?;
        Ok(self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned())
    }

    async fn record_processed(
        &self,
        source_id: &str,
        revision: &str,
        at: DateTime<Utc>,
    ) -> MetaDataResult<()> {
        self.failure.check("source_record_processed")?;
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                source_id.to_string(),
                SourceMetadata {
                    source_id: source_id.to_string(),
                    last_revision: revision.to_string(),
                    last_processed_at: at,
                    active: true,
                },
            );
        Ok(())
    }

    async fn list(&self) -> MetaDataResult<Vec<SourceMetadata>> {
        self.failure.check("source_list")?;
        let mut sources: Vec<SourceMetadata> = self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(sources)
    }
}
