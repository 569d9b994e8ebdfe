//! Deterministic in-memory embedding provider for tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::provider::EmbeddingProvider;

/// Produces deterministic vectors derived from the input text, so tests
/// can assert that the same content always embeds identically.
pub struct MockEmbeddingProvider {
    dimension: usize,
    fail_next: AtomicBool,
    batches: AtomicUsize,
}

impl MockEmbeddingProvider {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_next: AtomicBool::new(false),
            batches: AtomicUsize::new(0),
        }
    }

    /// Make the next `embed_batch` call fail with a retryable error
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of batches embedded so far
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        // Cheap deterministic hash spread across the vector.
        let mut seed: u32 = 2_166_136_261;
        for byte in text.bytes() {
            seed ^= u32::from(byte);
            seed = seed.wrapping_mul(16_777_619);
        }
        (0..self.dimension)
            .map(|i| {
                let v = seed.wrapping_add(i as u32).wrapping_mul(2_654_435_761);
                (v as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EmbeddingError::Network(
                "simulated embedding failure".to_string(),
            ));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_embeds_identically() {
        let provider = MockEmbeddingProvider::new(8);
        let a = provider.embed_batch(&["fn main() {}"]).await.unwrap();
        let b = provider.embed_batch(&["fn main() {}"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 8);
    }

    #[tokio::test]
    async fn different_texts_embed_differently() {
        let provider = MockEmbeddingProvider::new(8);
        let vectors = provider.embed_batch(&["alpha", "beta"]).await.unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn armed_failure_fires_once() {
        let provider = MockEmbeddingProvider::new(4);
        provider.fail_next();
        assert!(provider.embed_batch(&["x"]).await.is_err());
        assert!(provider.embed_batch(&["x"]).await.is_ok());
    }
}
