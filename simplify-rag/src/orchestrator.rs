//! RAG orchestrator.
//!
//! The [`RagOrchestrator`] ties extraction, chunking, embedding, indexing and
//! answer generation together behind two operations: [`ingest`] and [`ask`].
//!
//! [`ingest`]: RagOrchestrator::ingest
//! [`ask`]: RagOrchestrator::ask
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use simplify_rag::{
//!     ExtractiveAnswerGenerator, HashingEmbeddingProvider, RagOrchestrator, SourceFile,
//! };
//!
//! let rag = RagOrchestrator::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .answer_generator(Arc::new(ExtractiveAnswerGenerator))
//!     .build()?;
//!
//! rag.ingest(vec![SourceFile::from_path("notes.txt").await?], Default::default()).await?;
//! let answer = rag.ask("What color is the sky?", Default::default()).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunking::TextChunker;
use crate::config::{AskOptions, IngestOptions, RagConfig};
use crate::deadline::bounded;
use crate::document::{
    Answer, Document, IndexEntry, IngestFailure, IngestResult, QueryResult, SourceFile,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extract::extract;
use crate::generation::{AnswerGenerator, NO_CONTEXT_ANSWER};
use crate::inmemory::InMemoryVectorIndex;
use crate::persist::{SNAPSHOT_VERSION, Snapshot};
use crate::retriever::Retriever;
use crate::summarize::{EMPTY_DOCUMENT_SUMMARY, ExtractiveSummarizer, Summarizer, Summary, SummaryLength};
use crate::vectorstore::VectorIndex;

/// Lifecycle of an orchestrator session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has been committed since construction or the last reset.
    Empty,
    /// An ingest call is in flight.
    Ingesting,
    /// At least one document has been committed; questions can be asked.
    Ready,
}

/// The document registry, guarded together with index commits.
#[derive(Default)]
struct Registry {
    /// Documents in first-ingest order.
    documents: Vec<Document>,
    /// Whether any ingest has committed since construction or reset.
    committed: bool,
}

/// A file that made it through extraction and embedding, ready to commit.
struct PreparedDocument {
    document: Document,
    entries: Vec<IndexEntry>,
}

/// Decrements the in-flight ingest counter when dropped.
struct IngestGuard<'a>(&'a AtomicUsize);

impl<'a> IngestGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for IngestGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The RAG orchestrator.
///
/// Owns the vector index and the document registry. Ingest commits under an
/// exclusive lock; asks retrieve under the shared side of the same lock, so a
/// question never sees a half-committed document. Construct one via
/// [`RagOrchestrator::builder()`].
pub struct RagOrchestrator {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn AnswerGenerator>,
    summarizer: Arc<dyn Summarizer>,
    retriever: Retriever,
    registry: RwLock<Registry>,
    ingesting: AtomicUsize,
}

impl RagOrchestrator {
    /// Create a new [`RagOrchestratorBuilder`].
    pub fn builder() -> RagOrchestratorBuilder {
        RagOrchestratorBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// The current session state.
    pub async fn state(&self) -> SessionState {
        if self.ingesting.load(Ordering::SeqCst) > 0 {
            return SessionState::Ingesting;
        }
        if self.registry.read().await.committed {
            SessionState::Ready
        } else {
            SessionState::Empty
        }
    }

    /// Ingested documents in first-ingest order.
    pub async fn documents(&self) -> Vec<Document> {
        self.registry.read().await.documents.clone()
    }

    /// Ingest a batch of files: extract → chunk → embed → commit.
    ///
    /// Chunking parameters left unset in `options` come from the
    /// orchestrator's [`RagConfig`]. Files are processed concurrently (up to `max_workers`) and committed in
    /// input order in a single index write. A file that cannot be extracted or
    /// embedded is reported in [`IngestResult::failed`] and does not affect
    /// the rest of the batch. Re-ingesting a file name replaces the earlier
    /// version of that document.
    ///
    /// # Errors
    ///
    /// * [`RagError::ConfigError`] if `options` are inconsistent
    /// * [`RagError::DimensionMismatch`] or index errors, which abort the
    ///   whole call and leave the index unchanged
    pub async fn ingest(
        &self,
        files: Vec<SourceFile>,
        options: IngestOptions,
    ) -> Result<IngestResult> {
        self.ingest_with_cancel(files, options, &CancellationToken::new()).await
    }

    /// [`ingest`](Self::ingest) that can be abandoned through `cancel`.
    ///
    /// Cancellation before the commit leaves the index untouched and returns
    /// [`RagError::Cancelled`].
    pub async fn ingest_with_cancel(
        &self,
        files: Vec<SourceFile>,
        options: IngestOptions,
        cancel: &CancellationToken,
    ) -> Result<IngestResult> {
        let (chunk_size, chunk_overlap) = options.resolve(&self.config)?;
        let chunker = TextChunker::new(chunk_size, chunk_overlap)?;
        let _guard = IngestGuard::enter(&self.ingesting);
        let file_count = files.len();

        let outcomes: Vec<std::result::Result<PreparedDocument, IngestFailure>> =
            futures::stream::iter(files)
                .map(|file| self.prepare(file, &chunker, cancel))
                .buffered(self.config.max_workers)
                .collect()
                .await;

        if cancel.is_cancelled() {
            warn!(file_count, "ingest cancelled before commit");
            return Err(RagError::Cancelled { operation: "ingest".to_string() });
        }

        let mut result = IngestResult::default();
        let mut prepared = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(document) => prepared.push(document),
                Err(failure) if failure.error.is_per_file() => {
                    warn!(filename = %failure.filename, error = %failure.error, "skipping file");
                    result.failed.push(failure);
                }
                Err(failure) => return Err(failure.error),
            }
        }

        // The same file name twice in one batch: the later copy wins.
        let mut last_seen = HashMap::new();
        for (position, p) in prepared.iter().enumerate() {
            last_seen.insert(p.document.id.clone(), position);
        }
        let prepared: Vec<PreparedDocument> = prepared
            .into_iter()
            .enumerate()
            .filter(|(position, p)| last_seen.get(&p.document.id) == Some(position))
            .map(|(_, p)| p)
            .collect();

        if prepared.is_empty() {
            info!(file_count, failed = result.failed.len(), "ingest committed no documents");
            return Ok(result);
        }

        self.commit(prepared, &mut result).await?;

        info!(
            file_count,
            processed = result.processed_count,
            failed = result.failed.len(),
            chunk_count = result.total_chunks,
            "ingest completed"
        );
        Ok(result)
    }

    /// Extract, chunk and embed one file. Runs outside the commit lock.
    async fn prepare(
        &self,
        file: SourceFile,
        chunker: &TextChunker,
        cancel: &CancellationToken,
    ) -> std::result::Result<PreparedDocument, IngestFailure> {
        let filename = file.filename.clone();
        self.prepare_inner(file, chunker, cancel)
            .await
            .map_err(|error| IngestFailure { filename, error })
    }

    async fn prepare_inner(
        &self,
        file: SourceFile,
        chunker: &TextChunker,
        cancel: &CancellationToken,
    ) -> Result<PreparedDocument> {
        let filename = file.filename.clone();
        let extracted = tokio::task::spawn_blocking(move || extract(&file)).await.map_err(|e| {
            RagError::ExtractionFailure {
                filename: filename.clone(),
                message: format!("extraction task failed: {e}"),
            }
        })??;

        let document_id = Document::id_for(&filename);
        let mut chunks = chunker.chunk(&document_id, &extracted.text);

        if !chunks.is_empty() {
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            let embeddings = bounded(
                "embed",
                self.config.backend_timeout(),
                cancel,
                self.embedding_provider.embed_batch(&texts),
            )
            .await
            .map_err(|e| {
                error!(filename = %filename, provider = self.embedding_provider.name(), error = %e, "embedding failed");
                e
            })?;

            if embeddings.len() != chunks.len() {
                return Err(RagError::MalformedResponse {
                    backend: self.embedding_provider.name().to_string(),
                    message: format!(
                        "expected {} embeddings, got {}",
                        chunks.len(),
                        embeddings.len()
                    ),
                });
            }
            if let Some(position) = embeddings.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
                return Err(RagError::MalformedResponse {
                    backend: self.embedding_provider.name().to_string(),
                    message: format!("embedding {position} has non-finite components"),
                });
            }
            for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
                chunk.embedding = Some(embedding);
            }
        }

        let chunk_count = chunks.len();
        let entries = chunks
            .into_iter()
            .map(|chunk| IndexEntry::from_chunk(chunk, &filename))
            .collect::<Result<Vec<_>>>()?;

        debug!(filename = %filename, format = %extracted.format, chunk_count, "prepared document");

        Ok(PreparedDocument {
            document: Document {
                id: document_id,
                filename,
                format: extracted.format,
                text: extracted.text,
                ingested_at: Utc::now(),
                chunk_count,
            },
            entries,
        })
    }

    /// Replace earlier versions and write the batch, all under the exclusive lock.
    async fn commit(
        &self,
        prepared: Vec<PreparedDocument>,
        result: &mut IngestResult,
    ) -> Result<()> {
        let mut registry = self.registry.write().await;

        // Validate before mutating anything so a mismatch leaves the index intact.
        let expected = match self.index.dimension().await {
            Some(dimension) => Some(dimension),
            None => prepared.iter().flat_map(|p| p.entries.first()).map(|e| e.vector.len()).next(),
        };
        if let Some(expected) = expected {
            let mismatch = prepared
                .iter()
                .flat_map(|p| p.entries.iter())
                .find(|e| e.vector.len() != expected);
            if let Some(entry) = mismatch {
                error!(expected, actual = entry.vector.len(), "embedding dimension mismatch");
                return Err(RagError::DimensionMismatch { expected, actual: entry.vector.len() });
            }
        }

        let mut entries = Vec::new();
        let mut documents = Vec::with_capacity(prepared.len());
        for p in prepared {
            entries.extend(p.entries);
            documents.push(p.document);
        }
        let total_chunks = entries.len();

        let replacing: HashSet<&str> = documents
            .iter()
            .map(|d| d.id.as_str())
            .filter(|id| registry.documents.iter().any(|r| r.id == *id))
            .collect();
        // Earlier versions, kept so a failed write can put them back.
        let previous: Vec<IndexEntry> = if replacing.is_empty() {
            Vec::new()
        } else {
            self.index
                .entries()
                .await?
                .into_iter()
                .filter(|e| replacing.contains(e.document_id.as_str()))
                .collect()
        };

        let write = async {
            for id in &replacing {
                let replaced = self.index.delete(id).await?;
                debug!(document.id = %id, replaced, "replacing earlier version");
            }
            self.index.add(entries).await
        };
        if let Err(e) = write.await {
            error!(error = %e, "index write failed, keeping earlier versions");
            self.put_back(previous).await;
            return Err(e);
        }

        for document in documents {
            result.document_ids.push(document.id.clone());
            match registry.documents.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document,
                None => registry.documents.push(document),
            }
        }
        result.processed_count = result.document_ids.len();
        result.total_chunks = total_chunks;
        registry.committed = true;
        Ok(())
    }

    /// Re-add entries removed by a write that then failed.
    async fn put_back(&self, entries: Vec<IndexEntry>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        if let Err(e) = self.index.add(entries).await {
            error!(error = %e, count, "could not restore index entries after a failed write");
        }
    }

    /// Answer `query` from the ingested documents.
    ///
    /// When retrieval finds nothing the answer is [`NO_CONTEXT_ANSWER`] with
    /// no sources, and the generator is not called.
    ///
    /// # Errors
    ///
    /// * [`RagError::NotReady`] if nothing has been ingested
    /// * [`RagError::InvalidArgument`] if the resolved `top_k` is zero
    /// * retrieval errors ([`RagError::EmbeddingUnavailable`], ...)
    /// * [`RagError::GenerationUnavailable`] if the generation backend fails
    /// * [`RagError::Timeout`] naming the operation that ran out of time
    pub async fn ask(&self, query: &str, options: AskOptions) -> Result<Answer> {
        self.ask_with_cancel(query, options, &CancellationToken::new()).await
    }

    /// [`ask`](Self::ask) that can be abandoned through `cancel`.
    pub async fn ask_with_cancel(
        &self,
        query: &str,
        options: AskOptions,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let context = self.retrieve_with_cancel(query, options, cancel).await?;

        if context.is_empty() {
            info!(source_count = 0, "no relevant content for question");
            return Ok(Answer::grounded(NO_CONTEXT_ANSWER, &[]));
        }

        let answer = bounded(
            "generate",
            self.config.backend_timeout(),
            cancel,
            self.generator.generate(query, &context),
        )
        .await
        .map_err(|e| {
            error!(error = %e, "answer generation failed");
            e
        })?;

        info!(
            retrieved = context.len(),
            source_count = answer.sources.len(),
            "question answered"
        );
        Ok(answer)
    }

    /// Retrieve the chunks `ask` would use, without generating an answer.
    ///
    /// # Errors
    ///
    /// As for [`ask`](Self::ask), minus generation errors.
    pub async fn retrieve(&self, query: &str, options: AskOptions) -> Result<QueryResult> {
        self.retrieve_with_cancel(query, options, &CancellationToken::new()).await
    }

    async fn retrieve_with_cancel(
        &self,
        query: &str,
        options: AskOptions,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let registry = self.registry.read().await;
        if !registry.committed {
            return Err(RagError::NotReady);
        }
        let top_k = options.resolve(&self.config)?;
        self.retriever.retrieve_with_cancel(query, top_k, cancel).await
    }

    /// Summarize one ingested document.
    ///
    /// A document without text gets [`EMPTY_DOCUMENT_SUMMARY`] and the
    /// summarizer is not called.
    ///
    /// # Errors
    ///
    /// * [`RagError::NotReady`] if nothing has been ingested
    /// * [`RagError::InvalidArgument`] if no document has that ID
    /// * [`RagError::GenerationUnavailable`] or [`RagError::Timeout`] (`summarize`)
    pub async fn summarize(&self, document_id: &str, length: SummaryLength) -> Result<Summary> {
        self.summarize_with_cancel(document_id, length, &CancellationToken::new()).await
    }

    /// [`summarize`](Self::summarize) that can be abandoned through `cancel`.
    pub async fn summarize_with_cancel(
        &self,
        document_id: &str,
        length: SummaryLength,
        cancel: &CancellationToken,
    ) -> Result<Summary> {
        let document = {
            let registry = self.registry.read().await;
            if !registry.committed {
                return Err(RagError::NotReady);
            }
            registry.documents.iter().find(|d| d.id == document_id).cloned().ok_or_else(|| {
                RagError::InvalidArgument(format!("no document with id '{document_id}'"))
            })?
        };

        if document.text.trim().is_empty() {
            return Ok(Summary {
                document_id: document.id,
                length,
                text: EMPTY_DOCUMENT_SUMMARY.to_string(),
                truncated: false,
            });
        }

        let summary = bounded(
            "summarize",
            self.config.backend_timeout(),
            cancel,
            self.summarizer.summarize(&document, length),
        )
        .await
        .map_err(|e| {
            error!(document.id = document_id, error = %e, "summary failed");
            e
        })?;

        info!(document.id = document_id, %length, truncated = summary.truncated, "summarized document");
        Ok(summary)
    }

    /// Remove one document and its index entries.
    ///
    /// Returns the number of index entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if no document has that ID.
    pub async fn purge(&self, document_id: &str) -> Result<usize> {
        let mut registry = self.registry.write().await;
        let position = registry
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or_else(|| RagError::InvalidArgument(format!("no document with id '{document_id}'")))?;

        let removed = self.index.delete(document_id).await?;
        registry.documents.remove(position);
        info!(document.id = document_id, removed, "purged document");
        Ok(removed)
    }

    /// Drop every document and index entry, returning to [`SessionState::Empty`].
    pub async fn reset(&self) -> Result<()> {
        let mut registry = self.registry.write().await;
        self.index.clear().await?;
        *registry = Registry::default();
        info!("session reset");
        Ok(())
    }

    /// Write the documents and index entries to `path` as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let registry = self.registry.read().await;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            embedding_provider: self.embedding_provider.name().to_string(),
            embedding_model: self.embedding_provider.model().to_string(),
            dimension: self.index.dimension().await,
            documents: registry.documents.clone(),
            entries: self.index.entries().await?,
        };
        snapshot.write_to(path).await?;
        info!(
            path = %path.display(),
            document_count = snapshot.documents.len(),
            entry_count = snapshot.entries.len(),
            "saved index"
        );
        Ok(())
    }

    /// Replace the session with a snapshot written by [`save`](Self::save).
    ///
    /// A snapshot with at least one document leaves the session
    /// [`Ready`](SessionState::Ready).
    ///
    /// # Errors
    ///
    /// * [`RagError::Io`] / [`RagError::Persistence`] if the file is unreadable
    /// * [`RagError::ConfigError`] if it was built by another embedding provider or model
    /// * [`RagError::DimensionMismatch`] if its vectors do not fit this provider
    /// * [`RagError::Persistence`] if its entries are inconsistent
    ///
    /// A rejected snapshot leaves the session as it was.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot::read_from(path).await?;
        self.restore(snapshot).await?;
        debug!(path = %path.display(), "loaded index file");
        Ok(())
    }

    /// Replace the session with an already-read [`Snapshot`].
    ///
    /// # Errors
    ///
    /// As for [`load`](Self::load), minus file errors.
    pub async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let provider = self.embedding_provider.name();
        let model = self.embedding_provider.model();
        if snapshot.embedding_provider != provider || snapshot.embedding_model != model {
            return Err(RagError::ConfigError(format!(
                "index was built with {} model '{}', not {provider} model '{model}'",
                snapshot.embedding_provider, snapshot.embedding_model
            )));
        }
        let expected = self.embedding_provider.dimension();
        if let Some(actual) = snapshot.dimension.filter(|d| *d != expected) {
            return Err(RagError::DimensionMismatch { expected, actual });
        }
        if let Some(bad) = snapshot.entries.iter().find(|e| e.vector.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.vector.len() });
        }
        let known: HashSet<&str> = snapshot.documents.iter().map(|d| d.id.as_str()).collect();
        if let Some(orphan) = snapshot.entries.iter().find(|e| !known.contains(e.document_id.as_str())) {
            return Err(RagError::Persistence(format!(
                "entry '{}' belongs to unknown document '{}'",
                orphan.chunk_id, orphan.document_id
            )));
        }
        if let Some(bad) = snapshot.entries.iter().find(|e| e.vector.iter().any(|x| !x.is_finite())) {
            return Err(RagError::Persistence(format!(
                "entry '{}' has non-finite components",
                bad.chunk_id
            )));
        }

        let Snapshot { documents, entries, .. } = snapshot;
        let entry_count = entries.len();
        let mut registry = self.registry.write().await;
        let previous = self.index.entries().await?;

        let write = async {
            self.index.clear().await?;
            self.index.add(entries).await
        };
        if let Err(e) = write.await {
            error!(error = %e, "restoring snapshot failed, keeping the current index");
            if let Err(clear) = self.index.clear().await {
                error!(error = %clear, "could not clear partially restored index");
            }
            self.put_back(previous).await;
            return Err(e);
        }

        registry.committed = !documents.is_empty();
        registry.documents = documents;
        info!(document_count = registry.documents.len(), entry_count, "restored index");
        Ok(())
    }
}

/// Builder for constructing a [`RagOrchestrator`].
///
/// The embedding provider and answer generator are required. The
/// configuration defaults to [`RagConfig::default()`], the index to an
/// [`InMemoryVectorIndex`] sized for the embedding provider, and the
/// summarizer to [`ExtractiveSummarizer`].
#[derive(Default)]
pub struct RagOrchestratorBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    answer_generator: Option<Arc<dyn AnswerGenerator>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl RagOrchestratorBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector index backend.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the answer generator.
    pub fn answer_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.answer_generator = Some(generator);
        self
    }

    /// Set the document summarizer.
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Build the [`RagOrchestrator`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required component is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<RagOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .answer_generator
            .ok_or_else(|| RagError::ConfigError("answer_generator is required".to_string()))?;
        let summarizer = self.summarizer.unwrap_or_else(|| Arc::new(ExtractiveSummarizer));
        let index = self.vector_index.unwrap_or_else(|| {
            Arc::new(InMemoryVectorIndex::with_dimension(embedding_provider.dimension()))
        });

        let retriever =
            Retriever::new(embedding_provider.clone(), index.clone(), config.backend_timeout())
                .with_similarity_threshold(config.similarity_threshold);

        Ok(RagOrchestrator {
            config,
            embedding_provider,
            index,
            generator,
            summarizer,
            retriever,
            registry: RwLock::new(Registry::default()),
            ingesting: AtomicUsize::new(0),
        })
    }
}
