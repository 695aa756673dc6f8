//! Ollama embedding and completion backends.
//!
//! This module is only available when the `ollama` feature is enabled. Both
//! backends talk to a local Ollama daemon, so documents never leave the
//! machine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{CompletionRequest, TextCompletion};
use crate::http::{Role, check_embeddings, parse_body, post_json};

/// The default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The default Ollama embedding model.
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// The default Ollama generation model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

const BACKEND: &str = "Ollama";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

// ── Embeddings ──────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use simplify_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::connect("http://localhost:11434", "nomic-embed-text").await?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for a model whose dimensionality is already known.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }

    /// Create a provider, discovering the model's dimensionality with one sample request.
    ///
    /// # Errors
    ///
    /// Fails with [`RagError::EmbeddingUnavailable`] if the daemon cannot be
    /// reached or the model is not pulled.
    pub async fn connect(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let mut provider = Self::new(base_url, model, 0);
        let mut sample = provider.request(&["dimension check"]).await?;
        let dimension = sample.pop().map(|v| v.len()).unwrap_or(0);
        if dimension == 0 {
            return Err(RagError::MalformedResponse {
                backend: BACKEND.to_string(),
                message: format!("model '{}' returned an empty embedding", provider.model),
            });
        }
        debug!(model = %provider.model, dimension, "discovered embedding dimension");
        provider.dimension = dimension;
        Ok(provider)
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest { model: &self.model, input: texts };
        let url = endpoint(&self.base_url, "/api/embed");
        let text = post_json(Role::Embedding, BACKEND, self.client.post(&url), &body).await?;
        let response: EmbedResponse = parse_body(BACKEND, &text)?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text]).await?;
        results.pop().ok_or_else(|| RagError::MalformedResponse {
            backend: BACKEND.to_string(),
            message: "API returned no embedding".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = BACKEND, batch_size = texts.len(), model = %self.model, "embedding batch");
        let embeddings = self.request(texts).await?;
        check_embeddings(BACKEND, &embeddings, texts.len(), self.dimension)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Completion ──────────────────────────────────────────────────────

/// A [`TextCompletion`] backed by Ollama's `/api/generate` endpoint.
pub struct OllamaCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaCompletion {
    /// Create a completion backend for `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.1,
        }
    }

    /// Set the sampling temperature (default `0.1`).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl TextCompletion for OllamaCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(backend = BACKEND, model = %self.model, prompt_len = request.prompt.len(), "generating");

        let body = GenerateRequest {
            model: &self.model,
            system: &request.system,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };
        let url = endpoint(&self.base_url, "/api/generate");
        let text = post_json(Role::Generation, BACKEND, self.client.post(&url), &body).await?;
        let response: GenerateResponse = parse_body(BACKEND, &text)?;
        Ok(response.response)
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        assert_eq!(endpoint("http://localhost:11434/", "/api/embed"), "http://localhost:11434/api/embed");
    }

    #[test]
    fn generate_request_is_non_streaming() {
        let body = GenerateRequest {
            model: "llama3.2",
            system: "sys",
            prompt: "p",
            stream: false,
            options: GenerateOptions { temperature: 0.1 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["model"], "llama3.2");
    }

    #[test]
    fn responses_parse() {
        let embed: EmbedResponse =
            parse_body(BACKEND, r#"{"model":"m","embeddings":[[0.1,0.2],[0.3,0.4]]}"#).unwrap();
        assert_eq!(embed.embeddings.len(), 2);

        let generate: GenerateResponse =
            parse_body(BACKEND, r#"{"model":"m","response":"Blue [1].","done":true}"#).unwrap();
        assert_eq!(generate.response, "Blue [1].");
    }

    #[tokio::test]
    async fn unreachable_daemon_is_unavailable() {
        // Port 9 (discard) is essentially never served over HTTP.
        let provider = OllamaEmbeddingProvider::new("http://127.0.0.1:9", "nomic-embed-text", 4);
        assert_eq!(provider.model(), "nomic-embed-text");
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { .. }));

        let completion = OllamaCompletion::new("http://127.0.0.1:9", "llama3.2");
        let request = CompletionRequest { system: String::new(), prompt: "hi".to_string() };
        let err = completion.complete(&request).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationUnavailable { .. }));
    }
}
