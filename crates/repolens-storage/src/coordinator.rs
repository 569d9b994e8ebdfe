//! Hybrid storage coordinator
//!
//! Routes reads and writes across the authoritative relational store and
//! the derived vector engine according to the active mode. The primary
//! write is synchronous and its failure fails the operation; the vector
//! mirror is best-effort and its failure is logged and swallowed, to be
//! reconciled later by `migrate`.

use chrono::Utc;
use repolens_common::CorrelationId;
use repolens_meta_data::{EmbeddingRecord, EmbeddingStore, ScoredRecord};
use repolens_vector_data::VectorStorage;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::migration::{
    MigrateOptions, MigrationProgress, MigrationReport, SourceVerification, VerifyReport,
};
use crate::mode::StorageMode;

/// Coordinates the primary store and the vector mirror
pub struct StorageCoordinator {
    primary: Arc<dyn EmbeddingStore>,
    vector: Arc<dyn VectorStorage>,
    mode: RwLock<StorageMode>,
    migration_active: AtomicBool,
    progress: Mutex<Option<MigrationProgress>>,
}

/// Clears the migration flag and progress snapshot on every exit path
struct MigrationGuard<'a> {
    coordinator: &'a StorageCoordinator,
}

impl Drop for MigrationGuard<'_> {
    fn drop(&mut self) {
        self.coordinator
            .migration_active
            .store(false, Ordering::SeqCst);
        *self
            .coordinator
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl StorageCoordinator {
    pub fn new(
        primary: Arc<dyn EmbeddingStore>,
        vector: Arc<dyn VectorStorage>,
        mode: StorageMode,
    ) -> Self {
        Self {
            primary,
            vector,
            mode: RwLock::new(mode),
            migration_active: AtomicBool::new(false),
            progress: Mutex::new(None),
        }
    }

    /// Currently active mode
    pub fn mode(&self) -> StorageMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch modes. The only mode mutation, rejected while a migration
    /// is running.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MigrationInProgress` during a migration.
    pub fn set_mode(&self, mode: StorageMode) -> StorageResult<()> {
        if self.migration_active.load(Ordering::SeqCst) {
            return Err(StorageError::MigrationInProgress);
        }
        let mut current = self.mode.write().unwrap_or_else(PoisonError::into_inner);
        info!("Storage mode changed from {current} to {mode}");
        *current = mode;
        Ok(())
    }

    /// Progress of the running migration, `None` when idle
    pub fn migration_progress(&self) -> Option<MigrationProgress> {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_migration(&self) -> StorageResult<MigrationGuard<'_>> {
        if self
            .migration_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StorageError::MigrationInProgress);
        }
        Ok(MigrationGuard { coordinator: self })
    }

    fn update_progress(&self, migrated: u64, failed: u64) {
        let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = progress.as_mut() {
            p.migrated_records = migrated;
            p.failed_records = failed;
        }
    }

    /// Write records. The primary write is authoritative; in vector-enabled
    /// modes the mirror write failure is swallowed after a warning.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Primary` when the authoritative write fails.
    pub async fn write(
        &self,
        records: &[EmbeddingRecord],
        correlation_id: &CorrelationId,
    ) -> StorageResult<()> {
        self.primary.upsert_records(records).await?;

        if self.mode().vector_enabled()
            && let Err(e) = self.vector.upsert_records(records, correlation_id).await
        {
            warn!(
                correlation_id = %correlation_id,
                "Vector mirror write failed, primary remains authoritative: {e}"
            );
        }
        Ok(())
    }

    /// Similarity search: vector engine first in vector-enabled modes,
    /// primary cosine scan as the fallback.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Primary` when the fallback scan fails too.
    pub async fn search(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> StorageResult<Vec<ScoredRecord>> {
        if self.mode().vector_enabled() {
            match self
                .vector
                .search(query.to_vec(), source_id, limit, correlation_id)
                .await
            {
                Ok(results) => return Ok(results),
                Err(e) => {
                    warn!(
                        correlation_id = %correlation_id,
                        "Vector search failed, falling back to primary scan: {e}"
                    );
                }
            }
        }

        Ok(self.primary.search_similar(query, source_id, limit).await?)
    }

    /// Stream all primary records into the vector engine in batches.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MigrationInProgress` when one is already
    /// running, the primary read error that interrupted the stream, or the
    /// first vector write error when `continue_on_error` is false.
    pub async fn migrate(&self, options: MigrateOptions) -> StorageResult<MigrationReport> {
        let _guard = self.begin_migration()?;
        let batch_size = options.batch_size.max(1);
        let correlation_id = CorrelationId::new();

        if !options.validate_only {
            self.vector.ensure_collection().await?;
        }

        let total = self.primary.count_all().await?;
        let started = MigrationProgress::starting(total);
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = Some(started);
        info!(
            correlation_id = %correlation_id,
            total_records = total,
            validate_only = options.validate_only,
            "Starting storage migration"
        );

        let mut migrated: u64 = 0;
        let mut skipped: u64 = 0;
        let mut failed: u64 = 0;
        let mut after: Option<Uuid> = None;

        loop {
            let page = self.primary.list_page(after, batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);

            let mut batch = page;
            if options.skip_existing {
                let ids: Vec<Uuid> = batch.iter().map(|r| r.id).collect();
                let existing: HashSet<Uuid> =
                    self.vector.existing_ids(&ids).await?.into_iter().collect();
                let before = batch.len();
                batch.retain(|r| !existing.contains(&r.id));
                skipped += (before - batch.len()) as u64;
            }
            if batch.is_empty() {
                continue;
            }

            if options.validate_only {
                migrated += batch.len() as u64;
            } else {
                match self.vector.upsert_records(&batch, &correlation_id).await {
                    Ok(()) => migrated += batch.len() as u64,
                    Err(e) if options.continue_on_error => {
                        failed += batch.len() as u64;
                        warn!(
                            correlation_id = %correlation_id,
                            batch_len = batch.len(),
                            "Migration batch failed, continuing: {e}"
                        );
                    }
                    Err(e) => {
                        self.update_progress(migrated, failed);
                        return Err(e.into());
                    }
                }
            }
            self.update_progress(migrated, failed);
        }

        info!(
            correlation_id = %correlation_id,
            migrated_records = migrated,
            skipped_records = skipped,
            failed_records = failed,
            "Storage migration finished"
        );

        Ok(MigrationReport {
            total_records: total,
            migrated_records: migrated,
            skipped_records: skipped,
            failed_records: failed,
            validate_only: options.validate_only,
            started_at: started.started_at,
            finished_at: Utc::now(),
        })
    }

    /// Compare record counts between the two stores without writing.
    ///
    /// # Errors
    ///
    /// Returns the first read error from either store.
    pub async fn verify(&self) -> StorageResult<VerifyReport> {
        let primary_records = self.primary.count_all().await?;
        let vector_records = self.vector.count().await?;

        let mut sources = Vec::new();
        for (source_id, primary_count) in self.primary.count_by_source().await? {
            let vector_count = self.vector.count_source(&source_id).await?;
            sources.push(SourceVerification {
                source_id,
                primary_count,
                vector_count,
            });
        }

        Ok(VerifyReport {
            primary_records,
            vector_records,
            sources,
        })
    }

    /// Remove every record for a source from both stores.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConfirmationRequired` unless `confirm` is
    /// true, or the primary deletion error.
    pub async fn clear_source(&self, source_id: &str, confirm: bool) -> StorageResult<u64> {
        if !confirm {
            return Err(StorageError::ConfirmationRequired);
        }

        let removed = self.primary.delete_source(source_id).await?;
        if self.mode().vector_enabled()
            && let Err(e) = self.vector.delete_source(source_id).await
        {
            warn!("Vector delete for source '{source_id}' failed, will reconcile on migrate: {e}");
        }
        info!("Cleared {removed} records for source '{source_id}'");
        Ok(removed)
    }
}
