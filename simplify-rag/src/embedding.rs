//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (in-process hashing,
/// Ollama, OpenAI-compatible servers) behind a unified async interface. The
/// default [`embed_batch`](EmbeddingProvider::embed_batch) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it, returning exactly what the
/// per-item calls would.
///
/// A backend that cannot be reached must fail with
/// [`RagError::EmbeddingUnavailable`](crate::RagError::EmbeddingUnavailable);
/// it must never stand in a zero vector.
///
/// # Example
///
/// ```rust,ignore
/// use simplify_rag::EmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::new(512)?;
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    ///
    /// Fixed at construction time.
    fn dimension(&self) -> usize;

    /// A short name used in logs and error messages.
    fn name(&self) -> &str;

    /// The model producing the vectors.
    ///
    /// Vectors from different models are not comparable even when their
    /// dimensions agree, so snapshots record this next to [`name`](Self::name).
    /// Providers without a notion of models use their name.
    fn model(&self) -> &str {
        self.name()
    }
}
