//! Configuration surface for the RAG pipeline.
//!
//! Every knob has a documented default; [`RagConfig::from_env`] layers
//! environment overrides on top (loading a `.env` file first when present).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Configuration consumed by the ingestor, lifecycle manager, and pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RagConfig {
    /// Directory scanned for source documents when building the index.
    pub source_dir: PathBuf,
    /// Directory holding the persisted vector index. Owned by the lifecycle
    /// manager; only it may delete or rebuild the directory.
    pub persist_dir: PathBuf,
    /// Logical collection name; becomes the database file stem.
    pub collection: String,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Default number of chunks retrieved per query.
    pub retrieval_k: usize,
    /// Maximum assembled context length in characters, measured after
    /// concatenation.
    pub max_context_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./case_files"),
            persist_dir: PathBuf::from("./persisted_vectorstore"),
            collection: "case_chunks".to_string(),
            chunk_size: 800,
            chunk_overlap: 150,
            retrieval_k: 3,
            max_context_chars: 1000,
        }
    }
}

impl RagConfig {
    /// Builds a configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    ///
    /// Recognized variables: `RAG_SOURCE_DIR`, `RAG_PERSIST_DIR`,
    /// `RAG_COLLECTION`, `RAG_CHUNK_SIZE`, `RAG_CHUNK_OVERLAP`,
    /// `RAG_RETRIEVAL_K`, `RAG_MAX_CONTEXT_CHARS`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            source_dir: env::var("RAG_SOURCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.source_dir),
            persist_dir: env::var("RAG_PERSIST_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_dir),
            collection: env::var("RAG_COLLECTION").unwrap_or(defaults.collection),
            chunk_size: env_parse("RAG_CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: env_parse("RAG_CHUNK_OVERLAP", defaults.chunk_overlap),
            retrieval_k: env_parse("RAG_RETRIEVAL_K", defaults.retrieval_k),
            max_context_chars: env_parse("RAG_MAX_CONTEXT_CHARS", defaults.max_context_chars),
        }
    }

    /// Path of the sqlite database file inside the persistence directory.
    pub fn db_path(&self) -> PathBuf {
        self.persist_dir.join(format!("{}.sqlite", self.collection))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 150);
        assert_eq!(config.retrieval_k, 3);
        assert_eq!(config.max_context_chars, 1000);
    }

    #[test]
    fn db_path_uses_collection_name() {
        let config = RagConfig {
            persist_dir: PathBuf::from("/tmp/store"),
            collection: "cases".to_string(),
            ..Default::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/tmp/store/cases.sqlite"));
    }
}
