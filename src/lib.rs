//! Retrieval-augmented answering over a private case-file corpus.
//!
//! Documents (PDF, text, markdown) are split into overlapping chunks,
//! embedded, and persisted in a SQLite vector index; queries retrieve the
//! most similar chunks and feed them as context to a generation model.
//!
//! ```text
//! Source documents ──► ingestion::extract ──► chunking ──► embeddings
//!                                                             │
//!                                         stores::SqliteChunkStore ◄──┘
//!                                                  ▲
//! lifecycle::VectorstoreManager ───────────────────┘
//!        │            (load / build / corruption recovery / reset)
//!        ▼
//! retrieval::RagPipeline ──► generation ──► answer + cited chunks
//!        ▲
//! tools::RagToolkit (structured ingest/query payloads)
//! ```
//!
//! The lifecycle manager owns the only store handle: it lazily loads or
//! builds the persisted index on first use, detects a corrupt index and
//! rebuilds it from the corpus, and exposes an explicit reset. The pipeline
//! retries a corruption-classified search exactly once after a reset;
//! every tool-facing operation reports failure through structured payloads
//! instead of errors.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod ingestion;
pub mod lifecycle;
pub mod retrieval;
pub mod stores;
pub mod tools;
pub mod types;

pub use chunking::chunk_text;
pub use config::RagConfig;
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, OllamaEmbeddingProvider};
pub use generation::{GenerationProvider, MockGenerationProvider, OllamaGenerationProvider};
pub use ingestion::{Ingestor, discover_documents, extract_text};
pub use lifecycle::VectorstoreManager;
pub use retrieval::RagPipeline;
pub use stores::{ChunkRecord, SqliteChunkStore, VectorBackend};
pub use tools::RagToolkit;
pub use types::{
    IngestReport, QueryHit, RagAnswer, RagError, SearchResponse, StorageErrorKind,
};
