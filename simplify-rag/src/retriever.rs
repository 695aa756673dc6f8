//! Query-time retrieval: embed the question, search the index.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::deadline::bounded;
use crate::document::QueryResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorIndex;

/// Embeds a query and fetches the most similar chunks from a [`VectorIndex`].
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
    similarity_threshold: f32,
}

impl Retriever {
    /// Create a retriever over `index` using `embedding_provider` for queries.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        timeout: Duration,
    ) -> Self {
        Self { embedding_provider, index, timeout, similarity_threshold: f32::MIN }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Retrieve up to `top_k` chunks relevant to `query`.
    ///
    /// Asking for more results than the index holds returns everything; an
    /// empty result is not an error.
    ///
    /// # Errors
    ///
    /// * [`RagError::InvalidArgument`] if `top_k == 0`
    /// * embedding errors ([`RagError::EmbeddingUnavailable`],
    ///   [`RagError::MalformedResponse`], [`RagError::Timeout`])
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<QueryResult> {
        self.retrieve_with_cancel(query, top_k, &CancellationToken::new()).await
    }

    /// [`retrieve`](Self::retrieve) that can be abandoned through `cancel`.
    pub async fn retrieve_with_cancel(
        &self,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be at least 1".to_string()));
        }

        let query_embedding =
            bounded("embed", self.timeout, cancel, self.embedding_provider.embed(query))
                .await
                .map_err(|e| {
                    error!(provider = self.embedding_provider.name(), error = %e, "query embedding failed");
                    e
                })?;
        if query_embedding.iter().any(|x| !x.is_finite()) {
            return Err(RagError::MalformedResponse {
                backend: self.embedding_provider.name().to_string(),
                message: "query embedding has non-finite components".to_string(),
            });
        }

        let results = self.index.query(&query_embedding, top_k).await?;
        let threshold = self.similarity_threshold;
        let filtered: QueryResult = results.into_iter().filter(|r| r.score >= threshold).collect();

        debug!(top_k, result_count = filtered.len(), "retrieved chunks");
        Ok(filtered)
    }
}
