//! Embedding generation over HTTP with retry and circuit breaking
//!
//! The pipeline embeds file contents in batches. A transient service
//! failure retries with exponential backoff inside one job attempt; a
//! persistently failing service trips the circuit breaker so later
//! attempts fail fast and the job-level retry policy takes over.

pub mod breaker;
pub mod error;
pub mod http;
pub mod mock;
pub mod provider;

pub use breaker::CircuitBreaker;
pub use error::{EmbeddingError, EmbeddingResult};
pub use http::HttpEmbeddingProvider;
pub use mock::MockEmbeddingProvider;
pub use provider::EmbeddingProvider;
