// Embedder - maps text to a fixed-dimension semantic vector

use async_trait::async_trait;
use ollama::{EmbedRequest, OllamaClient};

/// Embedding dimension of all-MiniLM-L6-v2 (`all-minilm` in Ollama)
pub const DEFAULT_DIMENSION: usize = 384;

pub const DEFAULT_EMBED_MODEL: &str = "all-minilm";

/// Text-to-vector backend. Implementations must be deterministic for a
/// fixed model version and must not retry on failure.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;
}

/// Embedder backed by the Ollama `/api/embed` endpoint
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .embed(&request)
            .await
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Malformed("response contained no embeddings".to_string()))?;

        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Cannot embed empty input")]
    EmptyInput,

    #[error("Embedding backend error: {0}")]
    Backend(String),

    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_returning(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_embed_returns_first_vector() {
        let server = server_returning(json!({"embeddings": [[0.5, -0.5, 1.0]]})).await;
        let embedder = OllamaEmbedder::new(OllamaClient::with_base_url(server.uri()), "all-minilm", 3);

        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.5, -0.5, 1.0]);
        assert_eq!(embedder.dimension(), 3);
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_request() {
        // No mock mounted: any request would fail with a backend error.
        let server = MockServer::start().await;
        let embedder = OllamaEmbedder::new(OllamaClient::with_base_url(server.uri()), "all-minilm", 3);

        let err = embedder.embed("   ").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyInput));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let server = server_returning(json!({"embeddings": [[0.5, 0.5]]})).await;
        let embedder = OllamaEmbedder::new(OllamaClient::with_base_url(server.uri()), "all-minilm", 384);

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch { expected: 384, actual: 2 }
        ));
    }

    #[tokio::test]
    async fn test_missing_vectors_and_backend_failure() {
        let server = server_returning(json!({"embeddings": []})).await;
        let embedder = OllamaEmbedder::new(OllamaClient::with_base_url(server.uri()), "all-minilm", 3);
        assert!(matches!(
            embedder.embed("hello").await.unwrap_err(),
            EmbeddingError::Malformed(_)
        ));

        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing)
            .await;
        let embedder = OllamaEmbedder::new(OllamaClient::with_base_url(failing.uri()), "all-minilm", 3);
        assert!(matches!(
            embedder.embed("hello").await.unwrap_err(),
            EmbeddingError::Backend(_)
        ));
    }
}
