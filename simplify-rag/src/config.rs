//! Configuration for the RAG orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the RAG orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Timeout applied to every embedding and generation call, in seconds.
    pub backend_timeout_secs: u64,
    /// Maximum number of files extracted and embedded concurrently.
    pub max_workers: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            top_k: 3,
            similarity_threshold: 0.0,
            backend_timeout_secs: 60,
            max_workers: 4,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The backend timeout as a [`Duration`].
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `backend_timeout_secs == 0`
    /// - `max_workers == 0`
    /// - `similarity_threshold` is outside `[-1.0, 1.0]`
    pub fn validate(&self) -> Result<()> {
        check_chunking(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be at least 1".to_string()));
        }
        if self.backend_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "backend_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(RagError::ConfigError("max_workers must be greater than zero".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::ConfigError(format!(
                "similarity_threshold ({}) must be within [-1, 1]",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the backend call timeout.
    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.config.backend_timeout_secs = timeout.as_secs();
        self
    }

    /// Set how many files are processed concurrently during ingest.
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn check_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Per-call chunking parameters for [`ingest`](crate::RagOrchestrator::ingest).
///
/// Unset fields fall back to the orchestrator's [`RagConfig`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestOptions {
    /// Maximum chunk size in characters.
    pub chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: Option<usize>,
}

impl IngestOptions {
    /// Options that override both chunking parameters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: Some(chunk_size), chunk_overlap: Some(chunk_overlap) }
    }

    /// The `(chunk_size, chunk_overlap)` in force under `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn resolve(&self, config: &RagConfig) -> Result<(usize, usize)> {
        let chunk_size = self.chunk_size.unwrap_or(config.chunk_size);
        let chunk_overlap = self.chunk_overlap.unwrap_or(config.chunk_overlap);
        check_chunking(chunk_size, chunk_overlap)?;
        Ok((chunk_size, chunk_overlap))
    }
}

/// Per-call retrieval parameters for [`ask`](crate::RagOrchestrator::ask).
///
/// An unset `top_k` falls back to the orchestrator's [`RagConfig`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskOptions {
    /// Number of chunks to retrieve; must be at least 1.
    pub top_k: Option<usize>,
}

impl AskOptions {
    /// Options retrieving exactly `top_k` chunks.
    pub fn top_k(top_k: usize) -> Self {
        Self { top_k: Some(top_k) }
    }

    /// The `top_k` in force under `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if it is zero.
    pub fn resolve(&self, config: &RagConfig) -> Result<usize> {
        let top_k = self.top_k.unwrap_or(config.top_k);
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be at least 1".to_string()));
        }
        Ok(top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.backend_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn builder_rejects_inconsistent_values() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().max_workers(0).build().is_err());
        assert!(RagConfig::builder().backend_timeout(Duration::from_millis(10)).build().is_err());
        assert!(RagConfig::builder().similarity_threshold(1.5).build().is_err());
    }

    #[test]
    fn unset_options_fall_back_to_config() {
        let config = RagConfig::builder().chunk_size(256).chunk_overlap(32).top_k(5).build().unwrap();
        assert_eq!(IngestOptions::default().resolve(&config).unwrap(), (256, 32));
        assert_eq!(AskOptions::default().resolve(&config).unwrap(), 5);

        let partial = IngestOptions { chunk_size: Some(100), chunk_overlap: None };
        assert_eq!(partial.resolve(&config).unwrap(), (100, 32));
        assert_eq!(AskOptions::top_k(2).resolve(&config).unwrap(), 2);
    }

    #[test]
    fn overrides_are_validated() {
        let config = RagConfig::default();
        let overlap_too_big = IngestOptions { chunk_size: Some(100), chunk_overlap: None };
        assert!(matches!(overlap_too_big.resolve(&config), Err(RagError::ConfigError(_))));
        assert!(matches!(AskOptions::top_k(0).resolve(&config), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RagConfig = serde_json::from_str(r#"{"chunk_size": 400}"#).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 150);
    }
}
