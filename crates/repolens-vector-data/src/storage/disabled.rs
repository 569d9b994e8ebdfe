//! Stand-in used when vector storage is turned off
//!
//! The coordinator in primary-only mode never routes reads or writes
//! here; operations that do require the vector engine (migration,
//! verification, source clears) fail with a clear error instead of
//! silently doing nothing.

use async_trait::async_trait;
use repolens_common::CorrelationId;
use repolens_meta_data::{EmbeddingRecord, ScoredRecord};
use uuid::Uuid;

use crate::storage::VectorStorage;
use crate::{VectorDataError, VectorDataResult};

/// `VectorStorage` that rejects every operation
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledVectorStorage;

fn disabled<T>() -> VectorDataResult<T> {
    Err(VectorDataError::Storage(
        "vector storage is disabled".to_string(),
    ))
}

#[async_trait]
impl VectorStorage for DisabledVectorStorage {
    async fn collection_exists(&self) -> VectorDataResult<bool> {
        Ok(false)
    }

    async fn ensure_collection(&self) -> VectorDataResult<()> {
        disabled()
    }

    async fn drop_collection(&self) -> VectorDataResult<bool> {
        disabled()
    }

    async fn upsert_records(
        &self,
        _records: &[EmbeddingRecord],
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<()> {
        disabled()
    }

    async fn search(
        &self,
        _query: Vec<f32>,
        _source_id: Option<&str>,
        _limit: usize,
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<ScoredRecord>> {
        disabled()
    }

    async fn existing_ids(&self, _record_ids: &[Uuid]) -> VectorDataResult<Vec<Uuid>> {
        disabled()
    }

    async fn delete_records(&self, _record_ids: &[Uuid]) -> VectorDataResult<()> {
        disabled()
    }

    async fn delete_source(&self, _source_id: &str) -> VectorDataResult<()> {
        disabled()
    }

    async fn count(&self) -> VectorDataResult<u64> {
        disabled()
    }

    async fn count_source(&self, _source_id: &str) -> VectorDataResult<u64> {
        disabled()
    }
}
