//! Storage backends for chunk documents and their embeddings.
//!
//! The [`VectorBackend`] trait is the abstract contract the core consumes: a
//! persisted collection of `(id, vector, text, metadata)` records supporting
//! idempotent upsert and nearest-neighbor search. The shipped implementation
//! is [`SqliteChunkStore`] (SQLite plus the `sqlite-vec` extension); the
//! on-disk format is owned entirely by the store, the core only creates,
//! deletes, and checks non-emptiness of the persistence directory.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::RagError;

pub use sqlite::SqliteChunkStore;

/// A chunk record ready for storage, optionally carrying its embedding.
///
/// Ids are derived from `source` and `chunk_index`, so re-ingesting the same
/// logical chunk position of a document overwrites the previous record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique within the index: `"{source}_{chunk_index}"`.
    pub id: String,
    /// Filename of the originating document.
    pub source: String,
    /// Locator used to re-extract the document.
    pub source_path: String,
    /// Zero-based position within the source document.
    pub chunk_index: usize,
    /// The chunk text.
    pub content: String,
    /// The embedding vector, present on the write path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    /// Creates a record with the id derived from source and index.
    pub fn new(
        source: impl Into<String>,
        source_path: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
    ) -> Self {
        let source = source.into();
        Self {
            id: format!("{source}_{chunk_index}"),
            source,
            source_path: source_path.into(),
            chunk_index,
            content: content.into(),
            embedding: None,
        }
    }

    /// Attaches the embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Abstract contract over the persisted vector index.
///
/// Storage failures carry a typed [`crate::types::StorageErrorKind`] so the
/// lifecycle manager can classify corruption without inspecting messages.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Inserts or replaces records by id. Records without embeddings are
    /// skipped.
    async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<(), RagError>;

    /// All stored chunks for a source, ordered by `chunk_index`.
    async fn chunks_by_source(&self, source: &str) -> Result<Vec<ChunkRecord>, RagError>;

    /// Removes every chunk whose `source` matches, returning how many were
    /// deleted. A no-op (`Ok(0)`) when nothing matches.
    async fn delete_by_source(&self, source: &str) -> Result<usize, RagError>;

    /// Nearest-neighbor search: the `top_k` closest chunks with their cosine
    /// distances, ascending. `top_k` is clamped to the number of stored
    /// records.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize, RagError>;
}
