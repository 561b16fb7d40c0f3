//! Ingestion: turning source documents into embedded, persisted chunks.
//!
//! * [`extract`] — the extraction collaborator boundary (`file -> text`).
//! * [`ingest`] — the per-document pipeline (validate, extract, chunk,
//!   embed, replace-then-upsert) and corpus discovery.

pub mod extract;
pub mod ingest;

pub use extract::{SUPPORTED_EXTENSIONS, extract_text, is_supported};
pub use ingest::{Ingestor, discover_documents};
