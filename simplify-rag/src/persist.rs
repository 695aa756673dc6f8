//! JSON snapshots of an orchestrator's documents and index entries.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, IndexEntry};
use crate::error::{RagError, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Everything needed to restore a session without re-reading source files.
///
/// Each entry carries its chunk ID, vector, source file name, offsets and
/// text, so citations can be rebuilt from the snapshot alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Format version, see [`SNAPSHOT_VERSION`].
    pub version: u32,
    /// Name of the embedding provider that produced the vectors.
    pub embedding_provider: String,
    /// The provider's model, see [`EmbeddingProvider::model`](crate::EmbeddingProvider::model).
    pub embedding_model: String,
    /// Dimensionality of every vector in `entries`.
    pub dimension: Option<usize>,
    /// Ingested documents.
    pub documents: Vec<Document>,
    /// Index entries in insertion order.
    pub entries: Vec<IndexEntry>,
}

impl Snapshot {
    /// Write the snapshot to `path`, replacing any previous file atomically.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(self)
            .map_err(|e| RagError::Persistence(format!("cannot serialise snapshot: {e}")))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), bytes = bytes.len(), "wrote snapshot");
        Ok(())
    }

    /// Read a snapshot from `path`.
    ///
    /// # Errors
    ///
    /// [`RagError::Io`] if the file cannot be read, [`RagError::Persistence`]
    /// if it is not a snapshot of a supported version.
    pub async fn read_from(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: Self = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::Persistence(format!("cannot parse snapshot {}: {e}", path.display()))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RagError::Persistence(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION + 1,
            embedding_provider: "hashing".to_string(),
            embedding_model: "hashing".to_string(),
            dimension: None,
            documents: Vec::new(),
            entries: Vec::new(),
        };
        snapshot.write_to(&path).await.unwrap();
        assert!(matches!(Snapshot::read_from(&path).await, Err(RagError::Persistence(_))));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Snapshot::read_from(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
    }
}
