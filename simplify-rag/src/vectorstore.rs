//! Vector index trait for storing and searching chunk embeddings.

use async_trait::async_trait;

use crate::document::{IndexEntry, QueryResult};
use crate::error::Result;

/// A nearest-neighbour store of [`IndexEntry`]s.
///
/// All vectors in one index share a single dimensionality, either fixed at
/// construction or established by the first [`add`](VectorIndex::add).
/// Implementations may be exact or approximate; callers only rely on the
/// contract below.
///
/// # Example
///
/// ```rust,ignore
/// use simplify_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::with_dimension(384);
/// index.add(entries).await?;
/// let results = index.query(&query_embedding, 3).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add entries. An entry whose chunk ID already exists replaces it.
    ///
    /// The batch is all-or-nothing: if any vector's length disagrees with the
    /// index dimensionality the call fails with
    /// [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch)
    /// and the index is left unchanged.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Return up to `top_k` entries most similar to `vector`.
    ///
    /// Results are ordered by descending cosine similarity; equal scores keep
    /// insertion order.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<QueryResult>;

    /// Remove every entry belonging to `document_id`, returning how many were removed.
    async fn delete(&self, document_id: &str) -> Result<usize>;

    /// Remove every entry.
    ///
    /// A dimensionality fixed at construction survives; one established by
    /// `add` is forgotten.
    async fn clear(&self) -> Result<()>;

    /// All entries in insertion order, for snapshots.
    async fn entries(&self) -> Result<Vec<IndexEntry>>;

    /// Number of stored entries.
    async fn size(&self) -> usize;

    /// The established dimensionality, if any.
    async fn dimension(&self) -> Option<usize>;
}
