//! Splitting extracted text into overlapping chunks.
//!
//! [`TextChunker`] works on characters rather than bytes, so offsets stay
//! valid for any UTF-8 input and chunk text never splits a code point.

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Splits text into overlapping chunks of at most `chunk_size` characters.
///
/// Each cut prefers a sentence break (`.`, `!` or `?` followed by whitespace,
/// or a newline), then any whitespace, searching backwards from the budget
/// edge. The search never goes further back than half a chunk, nor past
/// `start + chunk_overlap + 1`; if nothing is found the text is cut hard at
/// the budget. The next chunk starts exactly `chunk_overlap` characters
/// before the previous cut, so consecutive chunks always share
/// `chunk_overlap` characters and every position of the input is covered.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`.
///
/// # Example
///
/// ```rust,ignore
/// use simplify_rag::TextChunker;
///
/// let chunker = TextChunker::new(1000, 150)?;
/// let chunks = chunker.chunk("report.pdf", &text);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Create a new `TextChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks belonging to `document_id`.
    ///
    /// Returns an empty `Vec` for empty text and exactly one chunk when the
    /// text fits in `chunk_size`. Returned chunks carry no embedding.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = self.cut_point(&chars, start);
            let chunk_index = chunks.len();

            chunks.push(Chunk {
                id: format!("{document_id}_{chunk_index}"),
                document_id: document_id.to_string(),
                text: chars[start..end].iter().collect(),
                start,
                end,
                embedding: None,
            });

            if end >= total {
                break;
            }
            // cut_point guarantees end > start + chunk_overlap
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Exclusive end of the chunk beginning at `start`.
    fn cut_point(&self, chars: &[char], start: usize) -> usize {
        let hard_end = (start + self.chunk_size).min(chars.len());
        if hard_end == chars.len() {
            return hard_end;
        }

        let floor = (start + (self.chunk_overlap + 1).max(self.chunk_size / 2)).min(hard_end);
        let mut word_break = None;

        for end in (floor..=hard_end).rev() {
            let prev = chars[end - 1];
            if prev == '\n' {
                return end;
            }
            if prev.is_whitespace() {
                if end >= 2 && matches!(chars[end - 2], '.' | '!' | '?') {
                    return end;
                }
                word_break.get_or_insert(end);
            }
        }

        word_break.unwrap_or(hard_end)
    }
}

/// Convenience wrapper: validate parameters and chunk in one call.
///
/// # Errors
///
/// See [`TextChunker::new`].
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    Ok(TextChunker::new(chunk_size, chunk_overlap)?.chunk(document_id, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_parameters() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(10, 10).is_err());
        assert!(TextChunker::new(10, 9).is_ok());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(20, 5).unwrap();
        assert!(chunker.chunk("doc", "").is_empty());
    }

    #[test]
    fn short_text_yields_one_chunk() {
        let chunker = TextChunker::new(100, 10).unwrap();
        let chunks = chunker.chunk("doc", "A short note.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "doc_0");
        assert_eq!(chunks[0].text, "A short note.");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let chunker = TextChunker::new(20, 5).unwrap();
        let chunks = chunker.chunk("sky", "The sky is blue. Water is wet.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "The sky is blue. ");
        assert_eq!(chunks[1].text, "lue. Water is wet.");
        assert_eq!(chunks[1].start, chunks[0].end - 5);
    }

    #[test]
    fn falls_back_to_hard_cut_without_whitespace() {
        let chunker = TextChunker::new(4, 1).unwrap();
        let chunks = chunker.chunk("d", "abcdefghij");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "defg", "ghij"]);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let chunker = TextChunker::new(3, 1).unwrap();
        let chunks = chunker.chunk("d", "ééééé");
        assert_eq!(chunks[0].text, "ééé");
        assert_eq!((chunks[1].start, chunks[1].end), (2, 5));
    }
}
