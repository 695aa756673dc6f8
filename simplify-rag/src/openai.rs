//! OpenAI-compatible embedding and chat-completion backends.
//!
//! This module is only available when the `openai` feature is enabled. The
//! base URL is configurable, so the same code serves the OpenAI API and local
//! OpenAI-compatible servers (LM Studio, llama.cpp, vLLM).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{CompletionRequest, TextCompletion};
use crate::http::{Role, check_embeddings, parse_body, post_json};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// The default model for OpenAI embeddings.
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const BACKEND: &str = "OpenAI";

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Connection settings shared by both backends.
#[derive(Clone)]
struct Connection {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Connection {
    fn new(api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: OPENAI_BASE_URL.to_string(), api_key }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let request = self.client.post(url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

fn api_key_from_env() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| RagError::ConfigError("OPENAI_API_KEY environment variable not set".into()))
}

// ── Embeddings ──────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable;
///   local servers usually need none.
///
/// # Example
///
/// ```rust,ignore
/// use simplify_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    connection: Connection,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }
        Ok(Self::with_connection(Connection::new(Some(api_key))))
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env()?)
    }

    /// Create a provider for a local OpenAI-compatible server that needs no key.
    pub fn local(base_url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        let mut provider = Self::with_connection(Connection::new(None));
        provider.connection.base_url = base_url.into();
        provider.model = model.into();
        provider.dimensions = dimensions;
        provider
    }

    fn with_connection(connection: Connection) -> Self {
        Self {
            connection,
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    /// Point the provider at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.connection.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimension()`](EmbeddingProvider::dimension).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text]).await?;
        results.pop().ok_or_else(|| RagError::MalformedResponse {
            backend: BACKEND.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = BACKEND, batch_size = texts.len(), model = %self.model, "embedding batch");

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let text =
            post_json(Role::Embedding, BACKEND, self.connection.post("/v1/embeddings"), &body)
                .await?;
        let response: EmbeddingResponse = parse_body(BACKEND, &text)?;
        let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();

        check_embeddings(BACKEND, &embeddings, texts.len(), self.dimensions)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Chat completion ─────────────────────────────────────────────────

/// A [`TextCompletion`] backed by an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAICompletion {
    connection: Connection,
    model: String,
    temperature: f32,
}

impl OpenAICompletion {
    /// Create a completion backend for `model` with the given API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }
        Ok(Self { connection: Connection::new(Some(api_key)), model: model.into(), temperature: 0.1 })
    }

    /// Create a completion backend using the `OPENAI_API_KEY` environment variable.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        Self::new(api_key_from_env()?, model)
    }

    /// Create a completion backend for a local server that needs no key.
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let mut connection = Connection::new(None);
        connection.base_url = base_url.into();
        Self { connection, model: model.into(), temperature: 0.1 }
    }

    /// Point the backend at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.connection.base_url = base_url.into();
        self
    }

    /// Set the sampling temperature (default `0.1`).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl TextCompletion for OpenAICompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        debug!(backend = BACKEND, model = %self.model, prompt_len = request.prompt.len(), "generating");

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: self.temperature,
        };
        let text = post_json(
            Role::Generation,
            BACKEND,
            self.connection.post("/v1/chat/completions"),
            &body,
        )
        .await?;
        let response: ChatResponse = parse_body(BACKEND, &text)?;

        response.choices.into_iter().next().and_then(|c| c.message.content).ok_or_else(|| {
            RagError::MalformedResponse {
                backend: BACKEND.into(),
                message: "response contained no message content".into(),
            }
        })
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::ConfigError(_))));
        assert!(matches!(OpenAICompletion::new("", "gpt-4o-mini"), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn matryoshka_dimensions_are_requested() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_dimensions(256);
        assert_eq!(provider.dimension(), 256);
        assert_eq!(provider.model(), "text-embedding-3-small");
        let body = EmbeddingRequest {
            model: &provider.model,
            input: &["a"],
            dimensions: provider.request_dimensions,
        };
        assert_eq!(serde_json::to_value(&body).unwrap()["dimensions"], 256);
    }

    #[test]
    fn chat_response_without_content_parses() {
        let response: ChatResponse =
            parse_body(BACKEND, r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert!(response.choices[0].message.content.is_none());
    }
}
