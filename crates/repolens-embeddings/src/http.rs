//! HTTP embedding client
//!
//! Talks to an OpenAI-compatible `/v1/embeddings` endpoint. Each batch is
//! retried with exponential backoff on transient failures, and all calls
//! pass through the circuit breaker so a down service fails fast instead
//! of burning a timeout per file.

use async_trait::async_trait;
use repolens_config::EmbeddingClientConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::provider::EmbeddingProvider;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// `EmbeddingProvider` backed by an HTTP embedding service
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    config: EmbeddingClientConfig,
    breaker: CircuitBreaker,
}

impl HttpEmbeddingProvider {
    /// # Errors
    ///
    /// Returns `EmbeddingError::Config` if the HTTP client cannot be built.
    pub fn new(config: EmbeddingClientConfig) -> EmbeddingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EmbeddingError::Config(format!("failed to build http client: {e}")))?;
        let breaker = CircuitBreaker::new(
            config.breaker_failure_threshold,
            config.breaker_open_timeout(),
        );
        Ok(Self {
            client,
            config,
            breaker,
        })
    }

    /// Probe the service health endpoint.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::Network` when the service is unreachable,
    /// or `EmbeddingError::Service` on a non-success status.
    pub async fn health_check(&self) -> EmbeddingResult<()> {
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(EmbeddingError::Service {
                status: status.as_u16(),
                message: "health check failed".to_string(),
            })
        }
    }

    async fn request_once(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingsRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        self.validate(texts.len(), body)
    }

    fn validate(&self, expected: usize, body: EmbeddingsResponse) -> EmbeddingResult<Vec<Vec<f32>>> {
        if body.data.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                body.data.len()
            )));
        }

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        for vector in &vectors {
            if vector.len() != self.config.dimension {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected dimension {}, got {}",
                    self.config.dimension,
                    vector.len()
                )));
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut backoff = self.config.initial_backoff();
        let mut attempt: u32 = 0;

        loop {
            self.breaker.check()?;

            match self.request_once(texts).await {
                Ok(vectors) => {
                    self.breaker.record_success();
                    debug!("Embedded batch of {} texts", texts.len());
                    return Ok(vectors);
                }
                Err(e) => {
                    self.breaker.record_failure();
                    if e.is_retryable() && attempt < self.config.max_retries {
                        attempt += 1;
                        warn!(
                            "Embedding batch failed (attempt {attempt}/{}), retrying in {backoff:?}: {e}",
                            self.config.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
