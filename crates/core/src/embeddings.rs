use crate::config::{EmbeddingProvider, RagConfig};
use crate::error::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Inputs per request sent to a remote embedding backend.
pub const EMBEDDING_BATCH_SIZE: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::EmbeddingService("backend returned no vector for the query".to_string())
        })
    }
}

pub fn build_embedder(config: &RagConfig) -> Result<Arc<dyn Embedder>, RagError> {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            &config.ollama_url,
            &config.embedding_model,
            config.request_timeout,
        )?)),
        EmbeddingProvider::Ngram => Ok(Arc::new(CharacterNgramEmbedder::default())),
    }
}

/// Checks a backend response against the request: one vector per input, a
/// single non-zero dimensionality, finite components only.
pub fn validate_embeddings(expected: usize, vectors: &[Vec<f32>]) -> Result<(), RagError> {
    if vectors.len() != expected {
        return Err(RagError::EmbeddingService(format!(
            "backend returned {} embeddings for {} inputs",
            vectors.len(),
            expected
        )));
    }

    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dimensions = first.len();
    if dimensions == 0 {
        return Err(RagError::EmbeddingService(
            "backend returned zero-dimensional embeddings".to_string(),
        ));
    }

    for (position, vector) in vectors.iter().enumerate() {
        if vector.len() != dimensions {
            return Err(RagError::EmbeddingService(format!(
                "embedding {position} has dimension {} instead of {dimensions}",
                vector.len()
            )));
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(RagError::EmbeddingService(format!(
                "embedding {position} contains non-finite values"
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// Embeddings from a local Ollama runtime via `POST /api/embed`.
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("pdf-rag/embed")
            .build()
            .map_err(|error| {
                RagError::InvalidConfig(format!("failed to build embedding http client: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    RagError::EmbeddingService(format!(
                        "embedding request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    RagError::EmbeddingService(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingService(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|error| {
            RagError::EmbeddingService(format!("malformed embedding response: {error}"))
        })?;

        validate_embeddings(texts.len(), &parsed.embeddings)?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            debug!(model = %self.model, batch = batch.len(), "requesting embeddings");
            vectors.extend(self.embed_chunk(batch).await?);
        }

        validate_embeddings(texts.len(), &vectors)?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow");
        let second = embedder.embed("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn ragged_vectors_are_rejected() {
        let vectors = vec![vec![0.1, 0.2], vec![0.3]];
        assert!(matches!(
            validate_embeddings(2, &vectors),
            Err(RagError::EmbeddingService(_))
        ));
        assert!(validate_embeddings(3, &[vec![1.0], vec![1.0]]).is_err());
        assert!(validate_embeddings(1, &[vec![f32::NAN]]).is_err());
    }

    #[tokio::test]
    async fn ngram_batch_preserves_order() -> Result<(), RagError> {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let vectors = embedder.embed_batch(&texts).await?;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], embedder.embed("first text"));
        assert_eq!(vectors[1], embedder.embed("second text"));
        Ok(())
    }

    #[tokio::test]
    async fn ollama_embedder_parses_batch_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body(json!({ "model": "nomic-embed-text", "input": ["a", "b"] }));
                then.status(200).json_body(json!({
                    "model": "nomic-embed-text",
                    "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
                }));
            })
            .await;

        let embedder =
            OllamaEmbedder::new(&server.base_url(), "nomic-embed-text", Duration::from_secs(5))
                .expect("client");
        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn ollama_embedder_reports_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("model not found");
            })
            .await;

        let embedder = OllamaEmbedder::new(&server.base_url(), "missing", Duration::from_secs(5))
            .expect("client");
        let error = embedder
            .embed_query("hello")
            .await
            .expect_err("should fail");

        assert!(matches!(error, RagError::EmbeddingService(_)));
        assert!(error.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn ollama_embedder_rejects_malformed_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({ "embeddings": [] }));
            })
            .await;

        let embedder = OllamaEmbedder::new(&server.base_url(), "m", Duration::from_secs(5))
            .expect("client");
        let result = embedder.embed_batch(&["only one".to_string()]).await;

        assert!(matches!(result, Err(RagError::EmbeddingService(_))));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_embedding_error() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "m", Duration::from_secs(2))
            .expect("client");
        let result = embedder.embed_query("hello").await;
        assert!(matches!(result, Err(RagError::EmbeddingService(_))));
    }
}
