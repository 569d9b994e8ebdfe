//! Trait abstraction over embedding generation
//!
//! The pipeline depends on this trait only, so the HTTP client can be
//! swapped for the in-memory mock in tests.

use async_trait::async_trait;

use crate::error::EmbeddingResult;

/// Generates embedding vectors for batches of text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input text, in input order
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors this provider produces
    fn embedding_dimension(&self) -> usize;

    /// Model identifier sent to (or simulated by) the provider
    fn model_name(&self) -> &str;
}
