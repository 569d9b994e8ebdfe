//! Error types for the vector storage layer

use thiserror::Error;

/// Result type alias for vector storage operations
pub type VectorDataResult<T> = Result<T, VectorDataError>;

/// Error type for vector storage operations
#[derive(Error, Debug)]
pub enum VectorDataError {
    /// Vector database connection or operation failures
    #[error("Vector storage error: {0}")]
    Storage(String),

    /// Collection configuration does not match expectations
    #[error("Collection error: {0}")]
    Collection(String),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}
