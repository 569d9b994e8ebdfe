//! Migration and verification report types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Options for a primary-to-vector bulk migration
#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    /// Records per batch read from the primary store
    pub batch_size: usize,
    /// Walk the data and report what would migrate, writing nothing
    pub validate_only: bool,
    /// Skip records already present as points in the vector engine
    pub skip_existing: bool,
    /// Count failed batches and keep going instead of aborting
    pub continue_on_error: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            validate_only: false,
            skip_existing: false,
            continue_on_error: false,
        }
    }
}

/// Mid-flight migration state, readable while the migration runs
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MigrationProgress {
    pub total_records: u64,
    pub migrated_records: u64,
    pub failed_records: u64,
    pub started_at: DateTime<Utc>,
}

impl MigrationProgress {
    #[must_use]
    pub fn starting(total_records: u64) -> Self {
        Self {
            total_records,
            migrated_records: 0,
            failed_records: 0,
            started_at: Utc::now(),
        }
    }
}

/// Final migration summary
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub total_records: u64,
    pub migrated_records: u64,
    pub skipped_records: u64,
    pub failed_records: u64,
    pub validate_only: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Per-source count comparison between the two stores
#[derive(Debug, Clone, Serialize)]
pub struct SourceVerification {
    pub source_id: String,
    pub primary_count: u64,
    pub vector_count: u64,
}

impl SourceVerification {
    #[must_use]
    pub const fn matches(&self) -> bool {
        self.primary_count == self.vector_count
    }
}

/// Read-only verification result
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub primary_records: u64,
    pub vector_records: u64,
    pub sources: Vec<SourceVerification>,
}

impl VerifyReport {
    /// True when totals and every per-source count agree
    #[must_use]
    pub fn in_sync(&self) -> bool {
        self.primary_records == self.vector_records
            && self.sources.iter().all(SourceVerification::matches)
    }
}
