//! Embedding providers: the trait boundary plus the Ollama-backed and mock
//! implementations.
//!
//! Embeddings for identical text are not guaranteed bit-identical across
//! provider versions; the core only assumes "same model version, same
//! vector".

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::RagError;

/// Converts text into fixed-dimension vectors.
///
/// Batch embedding preserves input order: one vector per input. Failures are
/// [`RagError::ProviderUnavailable`] when the backing service cannot be
/// reached or is not configured, [`RagError::Provider`] otherwise.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs and telemetry.
    fn name(&self) -> &str;

    /// Embeds a batch of texts, one vector per input in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embeds a single query string. Defaults to the batch path with a
    /// one-element input.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Provider("provider returned no embedding for query".into()))
    }
}

/// Request timeout applied to every embedding call, so a hung model never
/// blocks a caller indefinitely.
const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by a local Ollama daemon (`/api/embed`).
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingProvider {
    /// Creates a provider talking to `base_url` (e.g. `http://localhost:11434`)
    /// using the given embedding model.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?
            .error_for_status()
            .map_err(|err| RagError::Provider(err.to_string()))?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|err| RagError::Provider(format!("malformed embed response: {err}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        debug!(
            model = %self.model,
            batch = texts.len(),
            "embedded batch via ollama"
        );
        Ok(parsed.embeddings)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> RagError {
    if err.is_connect() || err.is_timeout() {
        RagError::ProviderUnavailable(err.to_string())
    } else {
        RagError::Provider(err.to_string())
    }
}

/// Deterministic hash-derived embeddings for tests and offline runs.
///
/// Identical text always maps to an identical unit vector. The provider also
/// counts calls so tests can assert that an operation never touched the
/// embedding path.
pub struct MockEmbeddingProvider {
    dims: usize,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_dims(16)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` invocations so far (the query path counts as
    /// one batch).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dims);
        for dim in 0..self.dims {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            dim.hash(&mut hasher);
            let raw = hasher.finish();
            // Map the hash into [-1, 1].
            let component = (raw as f64 / u64::MAX as f64) * 2.0 - 1.0;
            vector.push(component as f32);
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut vector {
                *value /= norm;
            }
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec![
            "hello world".to_string(),
            "goodbye world".to_string(),
            "hello world".to_string(),
        ];

        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn mock_embeddings_are_unit_length() {
        let provider = MockEmbeddingProvider::new();
        let vector = provider.embed_query("some text").await.unwrap();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[tokio::test]
    async fn ollama_provider_round_trips_batches() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(serde_json::json!({
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let provider = OllamaEmbeddingProvider::new(server.base_url(), "all-minilm").unwrap();
        let vectors = provider
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn ollama_provider_rejects_arity_mismatch() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(serde_json::json!({ "embeddings": [[0.1, 0.2]] }));
            })
            .await;

        let provider = OllamaEmbeddingProvider::new(server.base_url(), "all-minilm").unwrap();
        let err = provider
            .embed_batch(&["one".to_string(), "two".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::Provider(_)), "got {err:?}");
    }
}
