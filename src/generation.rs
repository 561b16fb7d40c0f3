//! Generation providers: the trait boundary plus the Ollama-backed and mock
//! implementations.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::RagError;

/// Produces answer text from a fully formatted prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Generates text for the prompt. Failure modes mirror the embedding
    /// boundary: [`RagError::ProviderUnavailable`] when the service cannot
    /// be reached, [`RagError::Provider`] otherwise.
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

/// Request timeout applied to every generation call.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Generation provider backed by a local Ollama daemon (`/api/generate`).
pub struct OllamaGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
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
impl GenerationProvider for OllamaGenerationProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    RagError::ProviderUnavailable(err.to_string())
                } else {
                    RagError::Provider(err.to_string())
                }
            })?
            .error_for_status()
            .map_err(|err| RagError::Provider(err.to_string()))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| RagError::Provider(format!("malformed generate response: {err}")))?;

        debug!(model = %self.model, chars = parsed.response.len(), "generated answer");
        Ok(parsed.response)
    }
}

/// Canned-answer provider for tests. Records the last prompt it saw and can
/// be flipped into a failing mode to exercise the pipeline's fixed error
/// string.
pub struct MockGenerationProvider {
    reply: String,
    fail: bool,
    last_prompt: Mutex<Option<String>>,
}

impl MockGenerationProvider {
    pub fn new() -> Self {
        Self::with_reply("Mock answer grounded in the provided context.")
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
            last_prompt: Mutex::new(None),
        }
    }

    /// A provider whose every call fails with a provider error.
    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            last_prompt: Mutex::new(None),
        }
    }

    /// The most recent prompt passed to `generate`, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

impl Default for MockGenerationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        *self.last_prompt.lock() = Some(prompt.to_string());
        if self.fail {
            return Err(RagError::Provider("mock generation failure".into()));
        }
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_records_prompts() {
        let provider = MockGenerationProvider::with_reply("ok");
        let answer = provider.generate("Answer: what happened?").await.unwrap();
        assert_eq!(answer, "ok");
        assert_eq!(
            provider.last_prompt().as_deref(),
            Some("Answer: what happened?")
        );
    }

    #[tokio::test]
    async fn ollama_provider_parses_response() {
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(serde_json::json!({ "response": "generated text" }));
            })
            .await;

        let provider = OllamaGenerationProvider::new(server.base_url(), "gemma3:270m").unwrap();
        let answer = provider.generate("a prompt").await.unwrap();

        mock.assert_async().await;
        assert_eq!(answer, "generated text");
    }
}
