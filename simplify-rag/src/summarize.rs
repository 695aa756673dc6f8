//! Whole-document summaries.
//!
//! [`Summarizer`] is what the orchestrator calls for
//! [`summarize`](crate::RagOrchestrator::summarize).
//! [`CompletionSummarizer`] prompts any [`TextCompletion`] backend;
//! [`ExtractiveSummarizer`] works offline by picking the sentences that carry
//! the document's most frequent content words.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::Document;
use crate::error::{RagError, Result};
use crate::generation::{CompletionRequest, STOP_WORDS, TextCompletion, quote_source, sentences};
use crate::hashing::tokens;

/// Summary returned for a document without any text.
pub const EMPTY_DOCUMENT_SUMMARY: &str = "The document contains no extractable text.";

/// Characters of document text sent to a completion backend.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 12_000;

const SUMMARY_INSTRUCTIONS: &str = "You summarize the user's private documents. Use only the \
document text provided. Do not add facts, opinions or recommendations that are not in the text.";

/// How long a summary should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    /// Two or three sentences.
    Short,
    /// The key points as a bullet list.
    #[default]
    Medium,
    /// Overview, main points and conclusions.
    Detailed,
}

impl SummaryLength {
    /// Sentences the extractive summarizer keeps.
    fn sentence_budget(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Medium => 5,
            Self::Detailed => 10,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::Short => "Write a summary of two or three sentences.",
            Self::Medium => "Summarize the key points as five to seven bullet points.",
            Self::Detailed => {
                "Write a detailed summary: a short overview paragraph, then the main sections \
                 with their key points as bullet points, then the conclusions."
            }
        }
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Detailed => "detailed",
        })
    }
}

impl FromStr for SummaryLength {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "detailed" => Ok(Self::Detailed),
            other => Err(RagError::InvalidArgument(format!(
                "unknown summary length '{other}' (expected short, medium or detailed)"
            ))),
        }
    }
}

/// A summary of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// The summarized document.
    pub document_id: String,
    /// The requested length.
    pub length: SummaryLength,
    /// The summary text.
    pub text: String,
    /// Whether only a prefix of the document was summarized.
    pub truncated: bool,
}

/// Produces a summary of a whole document.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `document` at the requested `length`.
    ///
    /// Called only for documents with non-blank text.
    async fn summarize(&self, document: &Document, length: SummaryLength) -> Result<Summary>;
}

/// A [`Summarizer`] that prompts a [`TextCompletion`] backend.
///
/// Documents longer than the input budget are cut at a character boundary and
/// the summary is flagged [`truncated`](Summary::truncated).
pub struct CompletionSummarizer<C> {
    completion: C,
    max_input_chars: usize,
}

impl<C: TextCompletion> CompletionSummarizer<C> {
    /// Wrap a completion backend.
    pub fn new(completion: C) -> Self {
        Self { completion, max_input_chars: DEFAULT_MAX_INPUT_CHARS }
    }

    /// Limit how much document text goes into one prompt.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }
}

/// Build the summary prompt for `text`, which already fits the input budget.
pub fn build_summary_prompt(filename: &str, text: &str, length: SummaryLength) -> CompletionRequest {
    let prompt = format!(
        "<<<BEGIN DOCUMENT source=\"{}\">>>\n{}\n<<<END DOCUMENT>>>\n\n{}",
        quote_source(filename),
        text.trim(),
        length.instruction()
    );
    CompletionRequest { system: SUMMARY_INSTRUCTIONS.to_string(), prompt }
}

#[async_trait]
impl<C: TextCompletion> Summarizer for CompletionSummarizer<C> {
    async fn summarize(&self, document: &Document, length: SummaryLength) -> Result<Summary> {
        let (text, truncated) = match document.text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => (&document.text[..cut], true),
            None => (document.text.as_str(), false),
        };
        let request = build_summary_prompt(&document.filename, text, length);
        debug!(backend = self.completion.name(), document.id = %document.id, %length, truncated, "requesting summary");

        let reply = self.completion.complete(&request).await.map_err(|e| {
            error!(backend = self.completion.name(), error = %e, "summary completion failed");
            e
        })?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(RagError::MalformedResponse {
                backend: self.completion.name().to_string(),
                message: "completion was empty".to_string(),
            });
        }

        Ok(Summary { document_id: document.id.clone(), length, text: reply.to_string(), truncated })
    }
}

/// An offline [`Summarizer`] that quotes the document's most representative sentences.
///
/// Sentences are scored by the average document frequency of their content
/// words; the best ones are kept in document order. Short summaries are a
/// paragraph, longer ones a bullet list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    fn content_words(text: &str) -> Vec<String> {
        tokens(text).filter(|t| !STOP_WORDS.contains(&t.as_str())).collect()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, document: &Document, length: SummaryLength) -> Result<Summary> {
        let mut frequency: HashMap<String, usize> = HashMap::new();
        for word in Self::content_words(&document.text) {
            *frequency.entry(word).or_default() += 1;
        }

        let candidates = sentences(&document.text);
        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(position, sentence)| {
                let words = Self::content_words(sentence);
                let total: usize = words.iter().map(|w| frequency.get(w).copied().unwrap_or(0)).sum();
                let score = if words.is_empty() { 0.0 } else { total as f32 / words.len() as f32 };
                (position, score)
            })
            .collect();

        // Stable: equal scores keep document order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut kept: Vec<usize> =
            scored.into_iter().take(length.sentence_budget()).map(|(p, _)| p).collect();
        kept.sort_unstable();

        let picked: Vec<&str> = kept.iter().map(|&p| candidates[p]).collect();
        let text = match length {
            SummaryLength::Short => picked.join(" "),
            SummaryLength::Medium | SummaryLength::Detailed => {
                picked.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n")
            }
        };

        Ok(Summary { document_id: document.id.clone(), length, text, truncated: false })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::document::DocumentFormat;

    fn document(text: &str) -> Document {
        Document {
            id: "report.txt".to_string(),
            filename: "report.txt".to_string(),
            format: DocumentFormat::PlainText,
            text: text.to_string(),
            ingested_at: Utc::now(),
            chunk_count: 1,
        }
    }

    struct Echo;

    #[async_trait]
    impl TextCompletion for Echo {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            Ok(request.prompt.clone())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    const REPORT: &str = "Solar output rose in March. The cafeteria menu changed. \
        Solar panels on the north roof produced most of the solar output. \
        Parking permits renew in May. Solar maintenance is scheduled for June.";

    #[test]
    fn lengths_parse_case_insensitively() {
        assert_eq!("Short".parse::<SummaryLength>().unwrap(), SummaryLength::Short);
        assert_eq!(" detailed ".parse::<SummaryLength>().unwrap(), SummaryLength::Detailed);
        assert!(matches!("huge".parse::<SummaryLength>(), Err(RagError::InvalidArgument(_))));
        assert_eq!(SummaryLength::default().to_string(), "medium");
    }

    #[tokio::test]
    async fn extractive_short_summary_keeps_central_sentences_in_order() {
        let summary =
            ExtractiveSummarizer.summarize(&document(REPORT), SummaryLength::Short).await.unwrap();
        assert_eq!(
            summary.text,
            "Solar output rose in March. \
             Solar panels on the north roof produced most of the solar output."
        );
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn extractive_medium_summary_is_a_bullet_list() {
        let summary =
            ExtractiveSummarizer.summarize(&document(REPORT), SummaryLength::Medium).await.unwrap();
        let lines: Vec<&str> = summary.text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|l| l.starts_with("- ")));
        assert_eq!(lines[0], "- Solar output rose in March.");
    }

    #[tokio::test]
    async fn completion_prompt_carries_text_and_instruction() {
        let summarizer = CompletionSummarizer::new(Echo);
        let summary = summarizer.summarize(&document(REPORT), SummaryLength::Short).await.unwrap();
        assert!(summary.text.starts_with("<<<BEGIN DOCUMENT source=\"report.txt\">>>"));
        assert!(summary.text.contains("Parking permits renew in May."));
        assert!(summary.text.ends_with(SummaryLength::Short.instruction()));
        assert!(!summary.truncated);
    }

    #[tokio::test]
    async fn long_documents_are_cut_to_the_input_budget() {
        let summarizer = CompletionSummarizer::new(Echo).with_max_input_chars(10);
        let long = document(&"ÄÖÜ ".repeat(10));
        let summary = summarizer.summarize(&long, SummaryLength::Medium).await.unwrap();
        assert!(summary.truncated);
        assert!(summary.text.contains("\nÄÖÜ ÄÖÜ ÄÖ\n<<<END DOCUMENT>>>"));
    }
}
