//! Service wiring and lifecycle
//!
//! Builds every collaborator in dependency order: database pool first,
//! then the stores, the embedding client, the storage coordinator, and
//! finally the scheduler. `serve` runs until a shutdown signal arrives,
//! then drains in-flight jobs before exiting.

use anyhow::Context;
use repolens_config::ApplicationConfig;
use repolens_embeddings::{EmbeddingProvider, HttpEmbeddingProvider};
use repolens_ingestion::scheduler::JobRunner;
use repolens_ingestion::{DedupGate, IngestionPipeline, Scheduler};
use repolens_meta_data::{
    DbDedupStore, DbEmbeddingStore, DbJobStore, DbSourceStore, DedupStore, EmbeddingStore,
    JobStore, SourceStore,
};
use repolens_storage::{StorageCoordinator, StorageMode};
use repolens_vector_data::{DisabledVectorStorage, QdrantStorage, VectorStorage};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// Connection attempts before startup gives up on the database
const DB_WAIT_ATTEMPTS: u32 = 30;

/// How often the queue depth is reported
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Fully wired service graph
pub struct Services {
    pub scheduler: Arc<Scheduler>,
    pub gate: Arc<DedupGate>,
    pub job_store: Arc<dyn JobStore>,
}

/// Run the ingestion service until a shutdown signal arrives
///
/// # Errors
///
/// Returns an error when wiring fails or the signal listener cannot be
/// installed.
pub async fn serve(config: ApplicationConfig) -> anyhow::Result<()> {
    let services = build_services(&config).await?;

    let scheduler = Arc::clone(&services.scheduler);
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });
    let sweeper = spawn_dedup_sweeper(Arc::clone(&services.gate), config.dedup.window());
    let reporter = spawn_stats_reporter(Arc::clone(&services.job_store));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining in-flight jobs");

    services
        .scheduler
        .shutdown_handle()
        .store(true, Ordering::SeqCst);
    scheduler_task.await.context("scheduler task panicked")?;
    sweeper.abort();
    reporter.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Connect and run idempotent schema setup, then exit
///
/// # Errors
///
/// Returns an error when the database is unreachable or DDL fails.
pub async fn migrate_schema(config: &ApplicationConfig) -> anyhow::Result<()> {
    let pool = repolens_meta_data::create_pool(&config.database)
        .await
        .context("failed to connect to the database")?;
    repolens_meta_data::initialize_database(&pool).await?;
    info!("Schema migration complete");
    Ok(())
}

/// Build the full service graph from configuration
///
/// # Errors
///
/// Returns an error when the database or vector engine is unreachable,
/// or the embedding client cannot be constructed.
pub async fn build_services(config: &ApplicationConfig) -> anyhow::Result<Services> {
    let pool = if config.database.auto_create_schema {
        repolens_meta_data::wait_for_database(&config.database, DB_WAIT_ATTEMPTS).await?
    } else {
        repolens_meta_data::create_pool(&config.database).await?
    };

    let job_store: Arc<dyn JobStore> = Arc::new(DbJobStore::new(
        pool.clone(),
        config.scheduler.retry_backoff(),
    ));
    let embedding_store: Arc<dyn EmbeddingStore> = Arc::new(DbEmbeddingStore::new(pool.clone()));
    let dedup_store: Arc<dyn DedupStore> = Arc::new(DbDedupStore::new(pool.clone()));
    let source_store: Arc<dyn SourceStore> = Arc::new(DbSourceStore::new(pool));

    let provider = Arc::new(HttpEmbeddingProvider::new(config.embedding.clone())?);
    if let Err(e) = provider.health_check().await {
        // The breaker covers runtime failures; startup only reports.
        warn!("Embedding service not healthy at startup: {e}");
    }

    let (vector, mode): (Arc<dyn VectorStorage>, StorageMode) = if config.vector_storage.enabled {
        let storage = QdrantStorage::new(&config.vector_storage)
            .await
            .context("failed to connect to vector storage")?;
        (Arc::new(storage), StorageMode::Hybrid)
    } else {
        info!("Vector storage disabled, running primary-only");
        (Arc::new(DisabledVectorStorage), StorageMode::PrimaryOnly)
    };
    info!(mode = %mode, "Storage coordinator mode selected");

    let storage = Arc::new(StorageCoordinator::new(
        Arc::clone(&embedding_store),
        vector,
        mode,
    ));

    let pipeline = Arc::new(IngestionPipeline::new(
        provider as Arc<dyn EmbeddingProvider>,
        Arc::clone(&storage),
        source_store,
        config.ingestion.clone(),
        config.embedding.batch_size,
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&job_store),
        pipeline as Arc<dyn JobRunner>,
        config.scheduler.clone(),
    ));

    let gate = Arc::new(DedupGate::new(dedup_store, config.dedup.window()));

    Ok(Services {
        scheduler,
        gate,
        job_store,
    })
}

/// Periodically remove expired dedup tickets
fn spawn_dedup_sweeper(gate: Arc<DedupGate>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match gate.sweep().await {
                Ok(0) => {}
                Ok(removed) => info!("Swept {removed} expired dedup tickets"),
                Err(e) => warn!("Dedup ticket sweep failed: {e}"),
            }
        }
    })
}

/// Periodically log queue depth per status
fn spawn_stats_reporter(job_store: Arc<dyn JobStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match job_store.queue_stats().await {
                Ok(stats) => info!(
                    pending = stats.pending,
                    processing = stats.processing,
                    retrying = stats.retrying,
                    completed = stats.completed,
                    failed = stats.failed,
                    "Queue depth"
                ),
                Err(e) => warn!("Failed to read queue stats: {e}"),
            }
        }
    })
}
