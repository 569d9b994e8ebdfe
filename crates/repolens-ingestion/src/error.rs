//! Error types for the ingestion layer

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type for ingestion operations
#[derive(Error, Debug)]
pub enum IngestionError {
    /// Failure in the metadata store (jobs, tickets, source state)
    #[error("Store error: {0}")]
    Store(#[from] repolens_meta_data::MetaDataError),

    /// Failure in the storage coordinator
    #[error("Storage error: {0}")]
    Storage(#[from] repolens_storage::StorageError),

    /// Failure generating embeddings
    #[error("Embedding error: {0}")]
    Embedding(#[from] repolens_embeddings::EmbeddingError),

    /// Failure taking the repository snapshot
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Job lookup that found nothing
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl From<git2::Error> for IngestionError {
    fn from(err: git2::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}

impl From<std::io::Error> for IngestionError {
    fn from(err: std::io::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}
