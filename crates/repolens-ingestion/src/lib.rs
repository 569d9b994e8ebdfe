//! Asynchronous ingestion: webhook gate, durable job scheduling, and the
//! snapshot-to-storage pipeline
//!
//! Flow: a webhook delivery passes the dedup gate, intake enqueues a
//! durable job, the scheduler claims it under the concurrency ceiling,
//! and the pipeline snapshots the repository, embeds its files, and
//! hands the records to the storage coordinator.

pub mod dedup;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod scheduler;

pub use dedup::{DedupGate, EventKind, GateDecision, WebhookEvent};
pub use error::{IngestionError, IngestionResult};
pub use intake::{IntakeOutcome, WebhookIntake};
pub use pipeline::{IngestionPipeline, IngestionReport, JobOutcome, source_id_from_locator};
pub use scheduler::{JobRunner, Scheduler, WaitResult};
