//! Error types for primary-store operations

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for primary-store operations
pub type MetaDataResult<T> = Result<T, MetaDataError>;

/// Errors that can occur against the relational store
#[derive(Error, Debug)]
pub enum MetaDataError {
    /// A query failed; `operation` names the logical store operation
    #[error("query failed during {operation}: {source}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Connection or pool setup failed
    #[error("database connection failed: {0}")]
    Connection(String),

    /// A compare-and-write lost: the row no longer held the expected status
    #[error("concurrent update conflict for job {job_id}: expected status '{expected}'")]
    Conflict { job_id: Uuid, expected: String },

    /// The requested row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Generic error for other issues
    #[error("{0}")]
    Other(String),
}

/// Extension trait attaching the logical operation name to sqlx errors
pub trait MetaDataErrorExt<T> {
    /// Map an sqlx error into `MetaDataError::Query` tagged with `operation`
    ///
    /// # Errors
    ///
    /// Returns the mapped error when the underlying result is an error.
    fn map_db_err(self, operation: &str) -> MetaDataResult<T>;
}

impl<T> MetaDataErrorExt<T> for Result<T, sqlx::Error> {
    fn map_db_err(self, operation: &str) -> MetaDataResult<T> {
        self.map_err(|source| MetaDataError::Query {
            operation: operation.to_string(),
            source,
        })
    }
}
