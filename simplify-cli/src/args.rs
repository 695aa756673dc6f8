//! CLI argument parsing using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use simplify_rag::SummaryLength;

/// Ask questions about your own documents, without sending them anywhere.
#[derive(Debug, Parser)]
#[command(name = "simplify", version, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct Settings {
    /// Where the index is stored
    #[arg(long, global = true, env = "SIMPLIFY_INDEX", default_value = ".simplify/index.json")]
    pub index: PathBuf,

    /// Embedding and generation backend
    #[arg(long, global = true, env = "SIMPLIFY_BACKEND", value_enum, default_value_t = Backend::Hashing)]
    pub backend: Backend,

    /// Generation model (default: llama3.2 for ollama, gpt-4o-mini for openai)
    #[arg(long, global = true, env = "SIMPLIFY_MODEL")]
    pub model: Option<String>,

    /// Embedding model (default: nomic-embed-text for ollama, text-embedding-3-small for openai)
    #[arg(long, global = true, env = "SIMPLIFY_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Embedding dimensions, required for OpenAI-compatible local servers
    #[arg(long, global = true, env = "SIMPLIFY_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Backend base URL
    #[arg(long, global = true, env = "SIMPLIFY_BASE_URL")]
    pub base_url: Option<String>,

    /// API key for the openai backend
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Timeout for each embedding or generation call, in seconds
    #[arg(long, global = true, env = "SIMPLIFY_TIMEOUT_SECS", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: u64,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Where embeddings and answers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Offline: hashed bag-of-words embeddings and extractive answers
    Hashing,
    /// A local Ollama daemon
    Ollama,
    /// The OpenAI API or an OpenAI-compatible server
    #[value(name = "openai")]
    OpenAi,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add files or directories to the index
    Ingest {
        /// Files to ingest; directories are searched for supported formats
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Maximum chunk size in characters [default: 1000]
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks [default: 150]
        #[arg(long)]
        overlap: Option<usize>,

        /// Files processed concurrently
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
        workers: u16,
    },

    /// Ask a single question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        #[command(flatten)]
        retrieval: Retrieval,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize one ingested document
    Summarize {
        /// Document ID as shown by `list`
        document_id: String,

        /// How long the summary should be
        #[arg(long, value_enum, default_value_t = Length::Medium)]
        length: Length,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask questions interactively
    Chat {
        #[command(flatten)]
        retrieval: Retrieval,
    },

    /// List ingested documents
    List,

    /// Remove one document from the index
    Purge {
        /// Document ID as shown by `list`
        document_id: String,
    },

    /// Remove every document from the index
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Length {
    /// Two or three sentences
    Short,
    /// The key points
    Medium,
    /// Overview, main points and conclusions
    Detailed,
}

impl From<Length> for SummaryLength {
    fn from(length: Length) -> Self {
        match length {
            Length::Short => Self::Short,
            Length::Medium => Self::Medium,
            Length::Detailed => Self::Detailed,
        }
    }
}

#[derive(Debug, Args)]
pub struct Retrieval {
    /// Number of passages retrieved per question
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub top_k: u8,
}
