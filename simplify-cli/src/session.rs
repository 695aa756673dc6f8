//! Builds an orchestrator for the selected backend and keeps its index on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use simplify_rag::ollama::{DEFAULT_OLLAMA_EMBEDDING_MODEL, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use simplify_rag::{
    AnswerGenerator, CompletionSummarizer, EmbeddingProvider, ExtractiveAnswerGenerator,
    ExtractiveSummarizer, GroundedAnswerGenerator, HashingEmbeddingProvider, OllamaCompletion,
    OllamaEmbeddingProvider, OpenAICompletion, OpenAIEmbeddingProvider, RagConfig,
    RagOrchestrator, Snapshot, Summarizer, TextCompletion,
};
use tracing::debug;

use crate::args::{Backend, Settings};

const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

/// An orchestrator bound to an index file.
pub struct Session {
    pub rag: RagOrchestrator,
    index_path: PathBuf,
}

impl Session {
    /// Build the backend and restore the index file if there is one.
    pub async fn open(settings: &Settings, max_workers: usize) -> Result<Self> {
        let snapshot = if tokio::fs::try_exists(&settings.index).await.unwrap_or(false) {
            Some(
                Snapshot::read_from(&settings.index)
                    .await
                    .with_context(|| format!("failed to read index {}", settings.index.display()))?,
            )
        } else {
            None
        };
        let known_dimension = snapshot.as_ref().and_then(|s| s.dimension);

        let config = RagConfig::builder()
            .backend_timeout(Duration::from_secs(settings.timeout_secs))
            .max_workers(max_workers)
            .build()?;

        let generator: Arc<dyn AnswerGenerator>;
        let summarizer: Arc<dyn Summarizer>;
        match completion(settings)? {
            Some(completion) => {
                generator = Arc::new(GroundedAnswerGenerator::new(completion.clone()));
                summarizer = Arc::new(CompletionSummarizer::new(completion));
            }
            None => {
                generator = Arc::new(ExtractiveAnswerGenerator);
                summarizer = Arc::new(ExtractiveSummarizer);
            }
        }

        let rag = RagOrchestrator::builder()
            .config(config)
            .embedding_provider(embedding_provider(settings, known_dimension).await?)
            .answer_generator(generator)
            .summarizer(summarizer)
            .build()?;

        if let Some(snapshot) = snapshot {
            rag.restore(snapshot).await.with_context(|| {
                format!(
                    "index {} does not match the {:?} backend and embedding model; use the ones it was built with or `simplify reset`",
                    settings.index.display(),
                    settings.backend
                )
            })?;
        }

        Ok(Self { rag, index_path: settings.index.clone() })
    }

    /// Write the index back to disk.
    pub async fn save(&self) -> Result<()> {
        self.rag
            .save(&self.index_path)
            .await
            .with_context(|| format!("failed to write index {}", self.index_path.display()))
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

async fn embedding_provider(
    settings: &Settings,
    known_dimension: Option<usize>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match settings.backend {
        Backend::Hashing => Arc::new(HashingEmbeddingProvider::default()),
        Backend::Ollama => {
            let base_url = settings.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            let model = settings
                .embedding_model
                .as_deref()
                .unwrap_or(DEFAULT_OLLAMA_EMBEDDING_MODEL);
            match known_dimension {
                Some(dimension) => Arc::new(OllamaEmbeddingProvider::new(base_url, model, dimension)),
                None => Arc::new(
                    OllamaEmbeddingProvider::connect(base_url, model)
                        .await
                        .with_context(|| format!("cannot reach Ollama at {base_url}"))?,
                ),
            }
        }
        Backend::OpenAi => {
            let mut provider = match (&settings.api_key, &settings.base_url) {
                (Some(key), _) => {
                    let provider = OpenAIEmbeddingProvider::new(key.clone())?;
                    match settings.embedding_dimensions {
                        Some(dimensions) => provider.with_dimensions(dimensions),
                        None => provider,
                    }
                }
                (None, Some(base_url)) => {
                    let model = settings
                        .embedding_model
                        .clone()
                        .context("--embedding-model is required for OpenAI-compatible local servers")?;
                    let dimensions = settings
                        .embedding_dimensions
                        .or(known_dimension)
                        .context("--embedding-dimensions is required for OpenAI-compatible local servers")?;
                    OpenAIEmbeddingProvider::local(base_url.clone(), model, dimensions)
                }
                (None, None) => bail!("the openai backend needs OPENAI_API_KEY or --base-url"),
            };
            if let Some(base_url) = &settings.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &settings.embedding_model {
                provider = provider.with_model(model.clone());
            }
            Arc::new(provider)
        }
    };
    debug!(provider = provider.name(), dimension = provider.dimension(), "embedding provider ready");
    Ok(provider)
}

/// The completion backend for answers and summaries; `None` means offline.
fn completion(settings: &Settings) -> Result<Option<Arc<dyn TextCompletion>>> {
    let completion: Arc<dyn TextCompletion> = match settings.backend {
        Backend::Hashing => return Ok(None),
        Backend::Ollama => {
            let base_url = settings.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            let model = settings.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
            Arc::new(OllamaCompletion::new(base_url, model))
        }
        Backend::OpenAi => {
            let model = settings.model.as_deref().unwrap_or(DEFAULT_OPENAI_CHAT_MODEL);
            let completion = match (&settings.api_key, &settings.base_url) {
                (Some(key), Some(base_url)) => {
                    OpenAICompletion::new(key.clone(), model)?.with_base_url(base_url.clone())
                }
                (Some(key), None) => OpenAICompletion::new(key.clone(), model)?,
                (None, Some(base_url)) => OpenAICompletion::local(base_url.clone(), model),
                (None, None) => bail!("the openai backend needs OPENAI_API_KEY or --base-url"),
            };
            Arc::new(completion)
        }
    };
    Ok(Some(completion))
}
