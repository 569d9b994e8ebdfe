//! Durable metadata layer: jobs, embedding records, dedup tickets, and
//! per-source state, all backed by `PostgreSQL`.
//!
//! Every store is a trait with a Postgres implementation and an in-memory
//! mock, so the scheduler and storage layers test against the same
//! contracts they run against in production.

pub mod dedup_store;
pub mod embedding_store;
pub mod error;
pub mod job_store;
pub mod mock;
pub mod models;
pub mod pool;
pub mod record_id;
pub mod schema;
pub mod source_store;

pub use dedup_store::{DbDedupStore, DedupStore};
pub use embedding_store::{DbEmbeddingStore, EmbeddingStore, cosine_similarity, rank_by_similarity};
pub use error::{MetaDataError, MetaDataErrorExt, MetaDataResult};
pub use job_store::{DbJobStore, JobStore};
pub use mock::{MockDedupStore, MockEmbeddingStore, MockJobStore, MockSourceStore};
pub use models::{
    DedupTicket, EmbeddingRecord, IngestionJob, JobStatus, QueueStats, ScoredRecord,
    SourceMetadata, TicketStatus,
};
pub use pool::create_pool;
pub use record_id::{generate_record_id, hash_content};
pub use schema::{initialize_database, wait_for_database};
pub use source_store::{DbSourceStore, SourceStore};
