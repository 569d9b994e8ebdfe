//! Authoritative embedding-record store
//!
//! The relational store owns the canonical record set; the vector engine is
//! a derived mirror. Besides upserts this module provides the keyset
//! pagination used by bulk migration and a brute-force cosine scan used as
//! the fallback search path when the vector engine is disabled or down.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{MetaDataErrorExt, MetaDataResult};
use crate::models::{EmbeddingRecord, ScoredRecord};

/// Authoritative store for embedding records
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Insert or replace records, keyed on `(source_id, unit_path)`
    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> MetaDataResult<()>;

    /// Keyset page ordered by record ID; pass the last ID of the previous
    /// page to continue
    async fn list_page(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> MetaDataResult<Vec<EmbeddingRecord>>;

    /// Total record count
    async fn count_all(&self) -> MetaDataResult<u64>;

    /// Record count per source, for verification
    async fn count_by_source(&self) -> MetaDataResult<Vec<(String, u64)>>;

    /// Brute-force cosine similarity search (fallback path)
    async fn search_similar(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        limit: usize,
    ) -> MetaDataResult<Vec<ScoredRecord>>;

    /// Delete every record for a source, returning the count removed
    async fn delete_source(&self, source_id: &str) -> MetaDataResult<u64>;
}

/// Cosine similarity between two vectors; 0.0 when either has zero norm
/// or the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot = y.mul_add(*x, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Rank candidates against a query vector, highest similarity first
pub fn rank_by_similarity(
    query: &[f32],
    candidates: Vec<EmbeddingRecord>,
    limit: usize,
) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = candidates
        .into_iter()
        .map(|record| {
            let score = cosine_similarity(query, &record.vector);
            ScoredRecord { record, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// `PostgreSQL` implementation of the embedding store
#[derive(Clone)]
pub struct DbEmbeddingStore {
    pool: PgPool,
}

impl DbEmbeddingStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<EmbeddingRecord, sqlx::Error> {
    Ok(EmbeddingRecord {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        unit_path: row.try_get("unit_path")?,
        content: row.try_get("content")?,
        language: row.try_get("language")?,
        revision: row.try_get("revision")?,
        vector: row.try_get("vector")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const RECORD_COLUMNS: &str =
    "id, source_id, unit_path, content, language, revision, vector, updated_at";

#[async_trait]
impl EmbeddingStore for DbEmbeddingStore {
    async fn upsert_records(&self, records: &[EmbeddingRecord]) -> MetaDataResult<()> {
        // Record IDs are deterministic per (source_id, unit_path), so the
        // conflict update never changes a row's identity.
        for record in records {
            sqlx::query(
                r"
                INSERT INTO embedding_records
                    (id, source_id, unit_path, content, language, revision, vector, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (source_id, unit_path) DO UPDATE
                SET content = EXCLUDED.content,
                    language = EXCLUDED.language,
                    revision = EXCLUDED.revision,
                    vector = EXCLUDED.vector,
                    updated_at = EXCLUDED.updated_at
                ",
            )
            .bind(record.id)
            .bind(&record.source_id)
            .bind(&record.unit_path)
            .bind(&record.content)
            .bind(&record.language)
            .bind(&record.revision)
            .bind(&record.vector)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_db_err("upsert_records")?;
        }
        Ok(())
    }

    async fn list_page(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> MetaDataResult<Vec<EmbeddingRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match after {
            Some(after_id) => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM embedding_records \
                     WHERE id > $1 ORDER BY id ASC LIMIT $2"
                ))
                .bind(after_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM embedding_records ORDER BY id ASC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_db_err("list_page")?;

        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_db_err("list_page")
    }

    async fn count_all(&self) -> MetaDataResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM embedding_records")
            .fetch_one(&self.pool)
            .await
            .map_db_err("count_all")?;
        let count: i64 = row.try_get("count").unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_by_source(&self) -> MetaDataResult<Vec<(String, u64)>> {
        let rows = sqlx::query(
            r"
            SELECT source_id, COUNT(*) as count
            FROM embedding_records
            GROUP BY source_id
            ORDER BY source_id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_db_err("count_by_source")?;

        Ok(rows
            .iter()
            .map(|row| {
                let source: String = row.try_get("source_id").unwrap_or_default();
                let count: i64 = row.try_get("count").unwrap_or(0);
                (source, u64::try_from(count).unwrap_or(0))
            })
            .collect())
    }

    async fn search_similar(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        limit: usize,
    ) -> MetaDataResult<Vec<ScoredRecord>> {
        let rows = match source_id {
            Some(source) => {
                sqlx::query(&format!(
                    "SELECT {RECORD_COLUMNS} FROM embedding_records WHERE source_id = $1"
                ))
                .bind(source)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM embedding_records"))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_db_err("search_similar")?;

        let candidates = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_db_err("search_similar")?;

        Ok(rank_by_similarity(query, candidates, limit))
    }

    async fn delete_source(&self, source_id: &str) -> MetaDataResult<u64> {
        let result = sqlx::query("DELETE FROM embedding_records WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_db_err("delete_source")?;
        Ok(result.rows_affected())
    }
}
