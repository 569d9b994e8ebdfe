//! In-memory vector storage for tests
//!
//! Behaves like the Qdrant backend from the coordinator's point of view:
//! points keyed by record ID, exact cosine ranking instead of approximate
//! search, and an armable failure switch for outage scenarios.

use async_trait::async_trait;
use repolens_common::CorrelationId;
use repolens_meta_data::{EmbeddingRecord, ScoredRecord, rank_by_similarity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::storage::VectorStorage;
use crate::{VectorDataError, VectorDataResult};

/// In-memory implementation of `VectorStorage`
#[derive(Default)]
pub struct MockVectorStorage {
    points: Mutex<HashMap<Uuid, EmbeddingRecord>>,
    collection_created: AtomicBool,
    fail_next: AtomicBool,
    fail_all: AtomicBool,
    upsert_failures: AtomicUsize,
}

impl MockVectorStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Make every call fail until `recover` is called
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// Clear the persistent failure mode
    pub fn recover(&self) {
        self.fail_all.store(false, Ordering::SeqCst);
    }

    /// Make the next `count` upsert calls fail, leaving other operations
    /// untouched
    pub fn fail_upserts(&self, count: usize) {
        self.upsert_failures.store(count, Ordering::SeqCst);
    }

    /// Number of stored points, for assertions
    pub fn point_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, EmbeddingRecord>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, operation: &str) -> VectorDataResult<()> {
        if self.fail_all.load(Ordering::SeqCst) || self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(VectorDataError::Storage(format!(
                "simulated vector outage in {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStorage for MockVectorStorage {
    async fn collection_exists(&self) -> VectorDataResult<bool> {
        self.check("collection_exists")?;
        Ok(self.collection_created.load(Ordering::SeqCst))
    }

    async fn ensure_collection(&self) -> VectorDataResult<()> {
        self.check("ensure_collection")?;
        self.collection_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_collection(&self) -> VectorDataResult<bool> {
        self.check("drop_collection")?;
        let existed = self.collection_created.swap(false, Ordering::SeqCst);
        self.lock().clear();
        Ok(existed)
    }

    async fn upsert_records(
        &self,
        records: &[EmbeddingRecord],
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<()> {
        self.check("upsert_records")?;
        if self
            .upsert_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(VectorDataError::Storage(
                "simulated upsert failure".to_string(),
            ));
        }
        let mut points = self.lock();
        for record in records {
            if !record.vector.is_empty() {
                points.insert(record.id, record.clone());
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query: Vec<f32>,
        source_id: Option<&str>,
        limit: usize,
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<ScoredRecord>> {
        self.check("search")?;
        let candidates: Vec<EmbeddingRecord> = self
            .lock()
            .values()
            .filter(|r| source_id.is_none_or(|s| r.source_id == s))
            .cloned()
            .collect();
        Ok(rank_by_similarity(&query, candidates, limit))
    }

    async fn existing_ids(&self, record_ids: &[Uuid]) -> VectorDataResult<Vec<Uuid>> {
        self.check("existing_ids")?;
        let points = self.lock();
        Ok(record_ids
            .iter()
            .filter(|id| points.contains_key(id))
            .copied()
            .collect())
    }

    async fn delete_records(&self, record_ids: &[Uuid]) -> VectorDataResult<()> {
        self.check("delete_records")?;
        let mut points = self.lock();
        for id in record_ids {
            points.remove(id);
        }
        Ok(())
    }

    async fn delete_source(&self, source_id: &str) -> VectorDataResult<()> {
        self.check("delete_source")?;
        self.lock().retain(|_, r| r.source_id != source_id);
        Ok(())
    }

    async fn count(&self) -> VectorDataResult<u64> {
        self.check("count")?;
        Ok(self.lock().len() as u64)
    }

    async fn count_source(&self, source_id: &str) -> VectorDataResult<u64> {
        self.check("count_source")?;
        Ok(self
            .lock()
            .values()
            .filter(|r| r.source_id == source_id)
            .count() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repolens_meta_data::generate_record_id;

    fn record(source: &str, path: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: generate_record_id(source, path),
            source_id: source.to_string(),
            unit_path: path.to_string(),
            content: String::new(),
            language: None,
            revision: "rev".to_string(),
            vector,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reupserting_a_record_replaces_the_point() {
        let storage = MockVectorStorage::new();
        let id = CorrelationId::new();

        storage
            .upsert_records(&[record("repo", "a.rs", vec![1.0, 0.0])], &id)
            .await
            .unwrap();
        storage
            .upsert_records(&[record("repo", "a.rs", vec![0.0, 1.0])], &id)
            .await
            .unwrap();

        assert_eq!(storage.count().await.unwrap(), 1);
        let hits = storage.search(vec![0.0, 1.0], None, 1, &id).await.unwrap();
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn search_filters_by_source() {
        let storage = MockVectorStorage::new();
        let id = CorrelationId::new();
        storage
            .upsert_records(
                &[
                    record("repo-a", "a.rs", vec![1.0, 0.0]),
                    record("repo-b", "b.rs", vec![1.0, 0.0]),
                ],
                &id,
            )
            .await
            .unwrap();

        let hits = storage
            .search(vec![1.0, 0.0], Some("repo-b"), 10, &id)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.source_id, "repo-b");
    }

    #[tokio::test]
    async fn outage_mode_fails_until_recovery() {
        let storage = MockVectorStorage::new();
        storage.fail_all();
        assert!(storage.count().await.is_err());
        storage.recover();
        assert!(storage.count().await.is_ok());
    }
}
