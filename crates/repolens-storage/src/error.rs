//! Error types for the storage coordinator

use thiserror::Error;

/// Result type alias for coordinator operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Error type for coordinator operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failure in the authoritative relational store
    #[error("Primary store error: {0}")]
    Primary(#[from] repolens_meta_data::MetaDataError),

    /// Failure in the vector engine when it cannot be swallowed
    #[error("Vector store error: {0}")]
    Vector(#[from] repolens_vector_data::VectorDataError),

    /// Mode changes are locked out while a migration runs
    #[error("A migration is in progress")]
    MigrationInProgress,

    /// Destructive operations need the explicit confirmation flag
    #[error("Destructive operation requires confirm = true")]
    ConfirmationRequired,

    /// Unrecognized mode name
    #[error("Invalid storage mode: {0}")]
    InvalidMode(String),
}
