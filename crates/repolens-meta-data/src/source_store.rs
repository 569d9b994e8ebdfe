//! Per-source processing state

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{MetaDataErrorExt, MetaDataResult};
use crate::models::SourceMetadata;

/// Store tracking the last processed revision per source
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn get(&self, source_id: &str) -> MetaDataResult<Option<SourceMetadata>>;

    /// Upsert the source row after a successful ingestion run
    async fn record_processed(
        &self,
        source_id: &str,
        revision: &str,
        at: DateTime<Utc>,
    ) -> MetaDataResult<()>;

    async fn list(&self) -> MetaDataResult<Vec<SourceMetadata>>;
}

/// `PostgreSQL` implementation of the source store
#[derive(Clone)]
pub struct DbSourceStore {
    pool: PgPool,
}

impl DbSourceStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceStore for DbSourceStore {
    async fn get(&self, source_id: &str) -> MetaDataResult<Option<SourceMetadata>> {
        sqlx::query_as::<_, SourceMetadata>(
            "SELECT source_id, last_revision, last_processed_at, active \
             FROM source_metadata WHERE source_id = $1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("source_get")
    }

    async fn record_processed(
        &self,
        source_id: &str,
        revision: &str,
        at: DateTime<Utc>,
    ) -> MetaDataResult<()> {
        sqlx::query(
            r"
            INSERT INTO source_metadata (source_id, last_revision, last_processed_at, active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (source_id) DO UPDATE
            SET last_revision = EXCLUDED.last_revision,
                last_processed_at = EXCLUDED.last_processed_at,
                active = TRUE
            ",
        )
        .bind(source_id)
        .bind(revision)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_db_err("source_record_processed")?;
        Ok(())
    }

    async fn list(&self) -> MetaDataResult<Vec<SourceMetadata>> {
        sqlx::query_as::<_, SourceMetadata>(
            "SELECT source_id, last_revision, last_processed_at, active \
             FROM source_metadata ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_db_err("source_list")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockSourceStore;

    #[tokio::test]
    async fn record_processed_upserts() {
        let store = MockSourceStore::new();
        let first = Utc::now();

        store
            .record_processed("team/app", "rev-1", first)
            .await
            .unwrap();
        store
            .record_processed("team/app", "rev-2", Utc::now())
            .await
            .unwrap();

        let meta = store.get("team/app").await.unwrap().unwrap();
        assert_eq!(meta.last_revision, "rev-2");
        assert!(meta.last_processed_at >= first);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_missing_source_is_none() {
        let store = MockSourceStore::new();
        assert!(store.get("unknown").await.unwrap().is_none());
    }
}
