//! In-memory vector index using cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], an exact linear-scan index
//! backed by an insertion-ordered `Vec` protected by a `tokio::sync::RwLock`.
//! A scan over a few tens of thousands of chunks is well within interactive
//! latency, and exactness keeps results reproducible.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{IndexEntry, QueryResult, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorIndex;

#[derive(Debug, Default)]
struct IndexState {
    /// Dimensionality fixed at construction, kept across `clear`.
    fixed_dimension: Option<usize>,
    /// Dimensionality in force: fixed, or taken from the first added vector.
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

/// An in-memory vector index using cosine similarity for search.
///
/// All operations are async-safe via `tokio::sync::RwLock`; a batch passed to
/// [`add`](VectorIndex::add) becomes visible to readers atomically.
///
/// # Example
///
/// ```rust,ignore
/// use simplify_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::with_dimension(512);
/// index.add(entries).await?;
/// assert_eq!(index.size().await, 3);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create an empty index whose dimensionality is set by the first `add`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index that only accepts `dimension`-length vectors.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            state: RwLock::new(IndexState {
                fixed_dimension: Some(dimension),
                dimension: Some(dimension),
                entries: Vec::new(),
            }),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let expected = state.dimension.unwrap_or(entries[0].vector.len());
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.vector.len() });
        }
        if expected == 0 {
            return Err(RagError::VectorStoreError {
                backend: "InMemory".to_string(),
                message: "cannot index empty vectors".to_string(),
            });
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.iter().any(|x| !x.is_finite())) {
            return Err(RagError::VectorStoreError {
                backend: "InMemory".to_string(),
                message: format!("entry '{}' has non-finite components", bad.chunk_id),
            });
        }

        state.dimension = Some(expected);
        for entry in entries {
            state.entries.retain(|e| e.chunk_id != entry.chunk_id);
            state.entries.push(entry);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<QueryResult> {
        let state = self.state.read().await;
        if let Some(expected) = state.dimension {
            if vector.len() != expected {
                return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
            }
        }

        let mut scored: Vec<SearchResult> = state
            .entries
            .iter()
            .map(|entry| {
                let score = cosine_similarity(&entry.vector, vector);
                SearchResult {
                    entry: entry.clone(),
                    score: if score.is_nan() { f32::NEG_INFINITY } else { score },
                }
            })
            .collect();

        // sort_by is stable, so equal scores keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|e| e.document_id != document_id);
        Ok(before - state.entries.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.dimension = state.fixed_dimension;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.state.read().await.entries.clone())
    }

    async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::EntryPayload;

    fn entry(chunk_id: &str, document_id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            vector,
            payload: EntryPayload {
                filename: document_id.to_string(),
                text: chunk_id.to_string(),
                start: 0,
                end: 0,
            },
        }
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn first_add_establishes_dimension() {
        let index = InMemoryVectorIndex::new();
        assert_eq!(index.dimension().await, None);
        index.add(vec![entry("a_0", "a", vec![1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(index.dimension().await, Some(3));

        let err = index.add(vec![entry("b_0", "b", vec![1.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn mismatched_batch_is_all_or_nothing() {
        let index = InMemoryVectorIndex::with_dimension(2);
        let batch = vec![entry("a_0", "a", vec![1.0, 0.0]), entry("a_1", "a", vec![1.0, 0.0, 1.0])];
        assert!(index.add(batch).await.is_err());
        assert_eq!(index.size().await, 0);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let index = InMemoryVectorIndex::new();
        index
            .add(vec![
                entry("first", "a", vec![1.0, 0.0]),
                entry("other", "a", vec![0.0, 1.0]),
                entry("second", "b", vec![2.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.entry.chunk_id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "other"]);
    }

    #[tokio::test]
    async fn non_finite_vectors_are_rejected() {
        let index = InMemoryVectorIndex::with_dimension(2);
        let batch = vec![entry("a_0", "a", vec![1.0, 0.0]), entry("a_1", "a", vec![f32::NAN, 0.0])];
        let err = index.add(batch).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { ref message, .. } if message.contains("a_1")));
        assert!(index.add(vec![entry("b_0", "b", vec![f32::INFINITY, 0.0])]).await.is_err());
        assert_eq!(index.size().await, 0);
    }

    #[tokio::test]
    async fn nan_scores_rank_last() {
        let index = InMemoryVectorIndex::with_dimension(2);
        index
            .add(vec![entry("weak", "a", vec![0.1, 1.0]), entry("strong", "a", vec![1.0, 0.1])])
            .await
            .unwrap();

        let results = index.query(&[f32::NAN, 1.0], 2).await.unwrap();
        assert!(results.iter().all(|r| r.score == f32::NEG_INFINITY));

        let results = index.query(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.entry.chunk_id.as_str()).collect();
        assert_eq!(ids, ["strong", "weak"]);
    }

    #[tokio::test]
    async fn re_adding_a_chunk_replaces_it() {
        let index = InMemoryVectorIndex::new();
        index.add(vec![entry("a_0", "a", vec![1.0, 0.0])]).await.unwrap();
        index.add(vec![entry("a_0", "a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.size().await, 1);
        let results = index.query(&[0.0, 1.0], 1).await.unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn clear_forgets_learned_but_keeps_fixed_dimension() {
        let learned = InMemoryVectorIndex::new();
        learned.add(vec![entry("a_0", "a", vec![1.0])]).await.unwrap();
        learned.clear().await.unwrap();
        assert_eq!(learned.dimension().await, None);

        let fixed = InMemoryVectorIndex::with_dimension(4);
        fixed.clear().await.unwrap();
        assert_eq!(fixed.dimension().await, Some(4));
    }
}
