//! Trait abstraction over the vector engine
//!
//! The storage coordinator never talks to Qdrant directly. Everything goes
//! through this trait, so the coordinator's fallback and migration logic
//! can be tested against the in-memory mock.

use async_trait::async_trait;
use repolens_common::CorrelationId;
use repolens_meta_data::{EmbeddingRecord, ScoredRecord};
use uuid::Uuid;

use crate::VectorDataResult;

/// Secondary (derived) storage for embedding records
#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// True when the backing collection exists
    async fn collection_exists(&self) -> VectorDataResult<bool>;

    /// Create the collection if missing; idempotent
    async fn ensure_collection(&self) -> VectorDataResult<()>;

    /// Drop the collection. Returns false when it did not exist.
    async fn drop_collection(&self) -> VectorDataResult<bool>;

    /// Upsert records as points keyed by their deterministic record ID
    async fn upsert_records(
        &self,
        records: &[EmbeddingRecord],
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<()>;

    /// Approximate nearest neighbor search, optionally filtered by source
    async fn search(
        &self,
        query: Vec<f32>,
        source_id: Option<&str>,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<ScoredRecord>>;

    /// Subset of `record_ids` that already exist as points
    async fn existing_ids(&self, record_ids: &[Uuid]) -> VectorDataResult<Vec<Uuid>>;

    /// Delete individual points by record ID
    async fn delete_records(&self, record_ids: &[Uuid]) -> VectorDataResult<()>;

    /// Delete every point belonging to a source
    async fn delete_source(&self, source_id: &str) -> VectorDataResult<()>;

    /// Number of points in the collection
    async fn count(&self) -> VectorDataResult<u64>;

    /// Number of points belonging to a source
    async fn count_source(&self, source_id: &str) -> VectorDataResult<u64>;
}
