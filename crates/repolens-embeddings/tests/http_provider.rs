//! HTTP provider behavior against a stubbed embedding service

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use repolens_config::EmbeddingClientConfig;
use repolens_embeddings::{EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str, max_retries: u32, breaker_threshold: u32) -> EmbeddingClientConfig {
    EmbeddingClientConfig {
        base_url: base_url.to_string(),
        model: "test-embedder".to_string(),
        dimension: 3,
        batch_size: 16,
        max_retries,
        initial_backoff_ms: 1,
        request_timeout_seconds: 5,
        breaker_failure_threshold: breaker_threshold,
        breaker_open_seconds: 60,
    }
}

fn embeddings_body(vectors: &[[f32; 3]]) -> serde_json::Value {
    json!({
        "data": vectors
            .iter()
            .enumerate()
            .map(|(index, v)| json!({ "index": index, "embedding": v }))
            .collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn embeds_a_batch_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(embeddings_body(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 0, 5)).unwrap();
    let vectors = provider.embed_batch(&["first", "second"]).await.unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
}

#[tokio::test]
async fn retries_transient_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embeddings_body(&[[0.5, 0.5, 0.5]])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 2, 5)).unwrap();
    let vectors = provider.embed_batch(&["text"]).await.unwrap();
    assert_eq!(vectors[0], vec![0.5, 0.5, 0.5]);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 2, 10)).unwrap();
    let err = provider.embed_batch(&["text"]).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Service { status: 500, .. }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 3, 10)).unwrap();
    let err = provider.embed_batch(&["text"]).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Service { status: 400, .. }));
}

#[tokio::test]
async fn breaker_opens_after_consecutive_failures() {
    let server = MockServer::start().await;
    // Two failed calls trip the breaker; the third never reaches the server.
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 0, 2)).unwrap();
    assert!(provider.embed_batch(&["a"]).await.is_err());
    assert!(provider.embed_batch(&["b"]).await.is_err());

    let err = provider.embed_batch(&["c"]).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::CircuitOpen));
}

#[tokio::test]
async fn rejects_dimension_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [{ "index": 0, "embedding": [1.0] }] })),
        )
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 0, 5)).unwrap();
    let err = provider.embed_batch(&["text"]).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
}

#[tokio::test]
async fn rejects_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(embeddings_body(&[[1.0, 0.0, 0.0]])),
        )
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 0, 5)).unwrap();
    let err = provider.embed_batch(&["one", "two"]).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
}

#[tokio::test]
async fn health_check_reports_service_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let provider = HttpEmbeddingProvider::new(config(&server.uri(), 0, 5)).unwrap();
    assert!(provider.health_check().await.is_ok());

    let unreachable = HttpEmbeddingProvider::new(config("http://127.0.0.1:1", 0, 5)).unwrap();
    assert!(unreachable.health_check().await.is_err());
}
