//! Offline embedding provider based on feature hashing.
//!
//! No model download, no network: every lowercase alphanumeric token is
//! hashed (FNV-1a) into one of `dimension` buckets, and the resulting count
//! vector is L2-normalised. Documents that share vocabulary with a query end
//! up close to it in cosine space, which is enough for keyword-style
//! retrieval over a small private corpus and keeps tests deterministic.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// The default number of hash buckets.
pub const DEFAULT_HASHING_DIMENSION: usize = 512;

/// An [`EmbeddingProvider`] that embeds text by hashing its tokens.
///
/// Text without a single alphanumeric token embeds to the zero vector, whose
/// cosine similarity with anything is `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbeddingProvider {
    dimension: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider with `dimension` buckets.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dimension == 0`.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::ConfigError("embedding dimension must be non-zero".to_string()));
        }
        Ok(Self { dimension })
    }

    fn bucket(&self, token: &str) -> usize {
        let hash = token
            .bytes()
            .fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(b)).wrapping_mul(FNV_PRIME));
        (hash % self.dimension as u64) as usize
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            embedding[self.bucket(&token)] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        embedding
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self { dimension: DEFAULT_HASHING_DIMENSION }
    }
}

/// Lowercase alphanumeric runs of `text`.
pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
