//! # simplify-rag
//!
//! Local, private question answering over your own documents.
//!
//! ## Overview
//!
//! `simplify-rag` turns a pile of PDFs, Word documents, slide decks and text
//! files into a searchable index and answers questions from it, citing the
//! passages each answer came from. Everything can run on the local machine:
//! embeddings and generation go through pluggable backends (a local Ollama
//! daemon, an OpenAI-compatible server, or the built-in offline providers).
//!
//! - [`extract`] pulls text out of the supported formats
//! - [`TextChunker`] splits text into overlapping, boundary-aware chunks
//! - [`EmbeddingProvider`] turns text into vectors
//! - [`VectorIndex`] stores vectors and answers nearest-neighbour queries
//! - [`Retriever`] embeds a question and fetches the closest chunks
//! - [`AnswerGenerator`] writes an answer grounded in those chunks
//! - [`Summarizer`] condenses a whole document to a short, medium or detailed summary
//! - [`RagOrchestrator`] runs the ingest, ask and summarize workflows end to end
//!
//! ## Feature Flags
//!
//! | Feature  | Backends                                                  |
//! |----------|-----------------------------------------------------------|
//! | *(none)* | [`HashingEmbeddingProvider`], [`InMemoryVectorIndex`], [`ExtractiveAnswerGenerator`], [`ExtractiveSummarizer`] |
//! | `ollama` | `OllamaEmbeddingProvider`, `OllamaCompletion`             |
//! | `openai` | `OpenAIEmbeddingProvider`, `OpenAICompletion`             |
//! | `full`   | all of the above                                          |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use simplify_rag::*;
//!
//! let rag = RagOrchestrator::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .answer_generator(Arc::new(ExtractiveAnswerGenerator))
//!     .build()?;
//!
//! let files = vec![SourceFile::new("sky.txt", "The sky is blue. Water is wet.")];
//! rag.ingest(files, IngestOptions::default()).await?;
//!
//! let answer = rag.ask("What color is the sky?", AskOptions::default()).await?;
//! println!("{} {:?}", answer.text, answer.sources);
//!
//! let summary = rag.summarize("sky.txt", SummaryLength::Short).await?;
//! println!("{}", summary.text);
//! ```

pub mod chunking;
pub mod config;
pub mod deadline;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod hashing;
pub mod inmemory;
pub mod orchestrator;
pub mod persist;
pub mod retriever;
pub mod summarize;
pub mod vectorstore;

#[cfg(any(feature = "ollama", feature = "openai"))]
mod http;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{TextChunker, chunk_text};
pub use config::{AskOptions, IngestOptions, RagConfig, RagConfigBuilder};
pub use document::{
    Answer, Chunk, Citation, Document, DocumentFormat, EntryPayload, IndexEntry, IngestFailure,
    IngestResult, QueryResult, SearchResult, SourceFile,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use extract::{ExtractedText, extract};
pub use generation::{
    AnswerGenerator, CompletionRequest, ExtractiveAnswerGenerator, GroundedAnswerGenerator,
    NO_CONTEXT_ANSWER, TextCompletion,
};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorIndex;
pub use orchestrator::{RagOrchestrator, RagOrchestratorBuilder, SessionState};
pub use persist::Snapshot;
pub use retriever::Retriever;
pub use summarize::{
    CompletionSummarizer, EMPTY_DOCUMENT_SUMMARY, ExtractiveSummarizer, Summarizer, Summary,
    SummaryLength,
};
pub use vectorstore::VectorIndex;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaCompletion, OllamaEmbeddingProvider};

#[cfg(feature = "openai")]
pub use openai::{OpenAICompletion, OpenAIEmbeddingProvider};

pub use tokio_util::sync::CancellationToken;
