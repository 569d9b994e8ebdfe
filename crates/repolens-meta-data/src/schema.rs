//! Idempotent schema setup
//!
//! The statements here are safe to run on every startup. A process must not
//! begin scheduling if this fails - schema unavailability is fatal for the
//! process, not for a job.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{MetaDataErrorExt, MetaDataResult};

const SCHEMA_STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS ingestion_jobs (
        job_id UUID PRIMARY KEY,
        processing_id UUID NOT NULL UNIQUE,
        repository_locator TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        last_error TEXT
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_ingestion_jobs_eligible
    ON ingestion_jobs (status, priority DESC, created_at ASC)
    ",
    r"
    CREATE TABLE IF NOT EXISTS embedding_records (
        id UUID PRIMARY KEY,
        source_id TEXT NOT NULL,
        unit_path TEXT NOT NULL,
        content TEXT NOT NULL,
        language TEXT,
        revision TEXT NOT NULL,
        vector REAL[] NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (source_id, unit_path)
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_embedding_records_source
    ON embedding_records (source_id)
    ",
    r"
    CREATE TABLE IF NOT EXISTS source_metadata (
        source_id TEXT PRIMARY KEY,
        last_revision TEXT NOT NULL,
        last_processed_at TIMESTAMPTZ NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS dedup_tickets (
        idempotency_key TEXT PRIMARY KEY,
        ticket_id UUID NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    ",
];

/// Create all tables and indexes if they do not exist
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub async fn initialize_database(pool: &PgPool) -> MetaDataResult<()> {
    info!("Ensuring database schema...");
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_db_err("initialize_database")?;
    }
    info!("Database schema ready");
    Ok(())
}

/// Wait for the database to accept connections, then ensure the schema
///
/// # Errors
///
/// Returns the last error once `max_attempts` connection attempts fail.
pub async fn wait_for_database(
    config: &repolens_config::DatabaseConfig,
    max_attempts: u32,
) -> MetaDataResult<PgPool> {
    let mut attempts = 0;

    loop {
        match crate::pool::create_pool(config).await {
            Ok(pool) => {
                initialize_database(&pool).await?;
                return Ok(pool);
            }
            Err(e) if attempts < max_attempts => {
                attempts = attempts.saturating_add(1);
                warn!("Database not ready (attempt {attempts}/{max_attempts}): {e}");
                sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
