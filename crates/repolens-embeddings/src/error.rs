//! Error types for embedding generation

use thiserror::Error;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Error type for embedding operations
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Transport-level failures talking to the embedding service
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP responses from the embedding service
    #[error("Embedding service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// The circuit breaker is open; no request was attempted
    #[error("Embedding service circuit is open")]
    CircuitOpen,

    /// Malformed or dimensionally wrong responses
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl EmbeddingError {
    /// True when a retry of the same request could succeed
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Service { status, .. } => *status >= 500 || *status == 429,
            Self::CircuitOpen | Self::InvalidResponse(_) | Self::Config(_) => false,
        }
    }
}
