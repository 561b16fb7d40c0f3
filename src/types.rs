//! Shared types for the RAG pipeline: the error taxonomy and the structured
//! payloads returned by the tool-facing operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to storage-level failures.
///
/// The sqlite layer assigns this kind when an error surfaces, so callers can
/// decide whether a persisted index is corrupt without matching on message
/// text themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorKind {
    /// The persisted index is unusable and should be rebuilt from the corpus.
    Corruption,
    /// Any other storage failure (I/O, constraint, query shape).
    Other,
}

/// Error taxonomy for ingestion, lifecycle, and retrieval operations.
///
/// Boundary operations ([`crate::tools::RagToolkit`]) never surface these to
/// their callers; they convert every failure into a structured
/// `success = false` payload. Internal helpers propagate them with `?`.
#[derive(Debug, Error)]
pub enum RagError {
    /// Caller supplied bad arguments; not retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The document's extension is outside the supported set.
    #[error("unsupported format '{extension}': supported formats are .pdf, .txt, .md, .markdown")]
    UnsupportedFormat { extension: String },

    /// The document path does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Extraction ran but produced an error or empty text.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// The embedding or generation service cannot be reached or is not
    /// configured.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Any other embedding/generation failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Storage-level failure, carrying a typed corruption classification.
    #[error("storage error: {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
    },

    /// The source directory holds no ingestable documents. Terminal: the
    /// operator must supply documents before retrying.
    #[error("no source documents found. To use the RAG system, place case files in: {dir}")]
    NoSourceDocuments { dir: String },

    /// Building the index from the corpus failed twice in a row.
    #[error("vectorstore build failed: {0}")]
    BuildFailed(String),

    /// Filesystem failure outside the vector store itself.
    #[error("io error: {0}")]
    Io(String),
}

impl RagError {
    /// Storage failure with no corruption signal.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            kind: StorageErrorKind::Other,
            message: message.into(),
        }
    }

    /// Storage failure classified as persisted-index corruption.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Storage {
            kind: StorageErrorKind::Corruption,
            message: message.into(),
        }
    }

    /// Returns `true` when this error indicates an unusable persisted index.
    ///
    /// Exactly one rebuild attempt is permitted in response; a second
    /// corruption signals a deeper problem and is surfaced as failure.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Storage {
                kind: StorageErrorKind::Corruption,
                ..
            }
        )
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// One retrieved match, a read-only projection over a stored chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryHit {
    /// The chunk text.
    pub content: String,
    /// Similarity derived from cosine distance as `1 - distance`.
    ///
    /// Cosine distance is bounded, so this lands in `[-1, 1]` and in
    /// practice `[0, 1]` for non-degenerate vectors. It is not re-normalized.
    pub score: f32,
    /// Filename of the originating document.
    pub source: String,
    /// Locator used to re-extract the document.
    pub source_path: String,
    /// Zero-based position of the chunk within its source.
    pub chunk_index: usize,
}

/// Outcome of ingesting one document. Never an `Err`: failures are reported
/// through `success = false` and a human-readable message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub success: bool,
    pub message: String,
    pub source: String,
    pub source_path: String,
    pub chunks_added: usize,
    pub duration_secs: f64,
}

impl IngestReport {
    pub(crate) fn failure(
        source: impl Into<String>,
        source_path: impl Into<String>,
        message: impl Into<String>,
        duration_secs: f64,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            source: source.into(),
            source_path: source_path.into(),
            chunks_added: 0,
            duration_secs,
        }
    }
}

/// Structured payload for the query tool. Every terminal outcome, including
/// "nothing found", is a normally-shaped response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub results_count: usize,
    pub results: Vec<QueryHit>,
    pub message: String,
}

/// A generated answer together with the exact chunks used as context, for
/// caller-side citation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RagAnswer {
    pub result: String,
    pub source_documents: Vec<QueryHit>,
}
