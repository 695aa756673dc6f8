//! Data types for documents, chunks, index entries and answers.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The source formats the extractor understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// UTF-8 plain text (including markdown).
    PlainText,
    /// Office Open XML word-processor document (`.docx`).
    WordProcessor,
    /// Office Open XML presentation (`.pptx`).
    Presentation,
}

impl DocumentFormat {
    /// Detect the format from a file name's extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = extension_of(filename).to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" | "md" | "markdown" => Some(Self::PlainText),
            "docx" => Some(Self::WordProcessor),
            "pptx" => Some(Self::Presentation),
            _ => None,
        }
    }

    /// Short tag used in logs and listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "text",
            Self::WordProcessor => "docx",
            Self::Presentation => "pptx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return the extension of `filename` without the dot, or `""`.
pub(crate) fn extension_of(filename: &str) -> &str {
    Path::new(filename).extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// A file handed to [`ingest`](crate::RagOrchestrator::ingest): a name plus its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// The original file name; its extension selects the extractor.
    pub filename: String,
    /// The raw file contents.
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Create a source file from a name and its contents.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), bytes: bytes.into() }
    }

    /// Read a file from disk. The file name (without directories) becomes
    /// [`filename`](Self::filename).
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self { filename, bytes })
    }
}

/// An ingested source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier, derived from the file name.
    pub id: String,
    /// The original file name.
    pub filename: String,
    /// The detected source format.
    pub format: DocumentFormat,
    /// The extracted text.
    pub text: String,
    /// When the document was ingested.
    pub ingested_at: DateTime<Utc>,
    /// Number of chunks the document produced.
    pub chunk_count: usize,
}

impl Document {
    /// The identifier a file with this name is stored under.
    ///
    /// Re-ingesting a file with the same name replaces the earlier version.
    pub fn id_for(filename: &str) -> String {
        filename.trim().to_string()
    }
}

/// A contiguous slice of a [`Document`]'s text.
///
/// Offsets are character (not byte) positions into the parent text, half-open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier: `{document_id}_{sequence}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// First character of the chunk in the parent text.
    pub start: usize,
    /// One past the last character of the chunk in the parent text.
    pub end: usize,
    /// The embedding, once computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Data stored alongside a vector, sufficient to cite the chunk without the source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryPayload {
    /// The source document's file name.
    pub filename: String,
    /// The chunk text.
    pub text: String,
    /// First character of the chunk in the source document.
    pub start: usize,
    /// One past the last character of the chunk in the source document.
    pub end: usize,
}

/// A chunk vector plus payload as persisted in a [`VectorIndex`](crate::VectorIndex).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// The chunk this entry was built from.
    pub chunk_id: String,
    /// The document the chunk belongs to.
    pub document_id: String,
    /// The chunk embedding.
    pub vector: Vec<f32>,
    /// Citation data.
    pub payload: EntryPayload,
}

impl IndexEntry {
    /// Build an entry from an embedded chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if the chunk has no embedding yet.
    pub fn from_chunk(chunk: Chunk, filename: &str) -> Result<Self> {
        let vector = chunk.embedding.ok_or_else(|| {
            RagError::InvalidArgument(format!("chunk '{}' has no embedding", chunk.id))
        })?;
        Ok(Self {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            vector,
            payload: EntryPayload {
                filename: filename.to_string(),
                text: chunk.text,
                start: chunk.start,
                end: chunk.end,
            },
        })
    }
}

/// A retrieved [`IndexEntry`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved entry.
    pub entry: IndexEntry,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Results of a nearest-neighbour query, descending by score.
pub type QueryResult = Vec<SearchResult>;

/// A source reference attached to an [`Answer`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// The cited chunk.
    pub chunk_id: String,
    /// The document the chunk came from.
    pub filename: String,
    /// First character of the chunk in the source document.
    pub start: usize,
    /// One past the last character of the chunk in the source document.
    pub end: usize,
    /// The chunk text.
    pub text: String,
    /// Retrieval score of the chunk.
    pub score: f32,
}

impl From<&SearchResult> for Citation {
    fn from(result: &SearchResult) -> Self {
        let payload = &result.entry.payload;
        Self {
            chunk_id: result.entry.chunk_id.clone(),
            filename: payload.filename.clone(),
            start: payload.start,
            end: payload.end,
            text: payload.text.clone(),
            score: result.score,
        }
    }
}

/// A generated answer with the chunks that grounded it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// IDs of the chunks used as sources, in retrieval order.
    pub sources: Vec<String>,
    /// Full citations for [`sources`](Self::sources), same order.
    pub citations: Vec<Citation>,
}

impl Answer {
    /// Build an answer whose sources are the given retrieval results.
    pub fn grounded(text: impl Into<String>, used: &[&SearchResult]) -> Self {
        Self {
            text: text.into(),
            sources: used.iter().map(|r| r.entry.chunk_id.clone()).collect(),
            citations: used.iter().map(|r| Citation::from(*r)).collect(),
        }
    }
}

/// A file that could not be ingested, and why.
#[derive(Debug)]
pub struct IngestFailure {
    /// The file name as supplied.
    pub filename: String,
    /// What went wrong.
    pub error: RagError,
}

/// Outcome of an ingest call.
#[derive(Debug, Default)]
pub struct IngestResult {
    /// Number of files committed to the index (including empty ones).
    pub processed_count: usize,
    /// Files that failed, in input order.
    pub failed: Vec<IngestFailure>,
    /// Number of chunks committed.
    pub total_chunks: usize,
    /// IDs of the committed documents, in input order.
    pub document_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_case_insensitively() {
        assert_eq!(DocumentFormat::from_filename("report.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_filename("notes.md"), Some(DocumentFormat::PlainText));
        assert_eq!(DocumentFormat::from_filename("a.b.docx"), Some(DocumentFormat::WordProcessor));
        assert_eq!(DocumentFormat::from_filename("deck.pptx"), Some(DocumentFormat::Presentation));
        assert_eq!(DocumentFormat::from_filename("image.png"), None);
        assert_eq!(DocumentFormat::from_filename("README"), None);
    }

    #[test]
    fn entry_requires_embedding() {
        let chunk = Chunk {
            id: "a_0".into(),
            document_id: "a".into(),
            text: "hello".into(),
            start: 0,
            end: 5,
            embedding: None,
        };
        assert!(matches!(
            IndexEntry::from_chunk(chunk.clone(), "a"),
            Err(RagError::InvalidArgument(_))
        ));

        let entry =
            IndexEntry::from_chunk(Chunk { embedding: Some(vec![1.0, 0.0]), ..chunk }, "a.txt")
                .unwrap();
        assert_eq!(entry.chunk_id, "a_0");
        assert_eq!(entry.payload.filename, "a.txt");
        assert_eq!((entry.payload.start, entry.payload.end), (0, 5));
    }
}
