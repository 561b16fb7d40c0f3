//! Per-document ingestion and corpus discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::chunking::chunk_text;
use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::stores::{ChunkRecord, VectorBackend};
use crate::types::{IngestReport, RagError};

use super::extract::{extract_text, is_supported};

/// Lists the ingestable documents under `dir`, sorted by path.
///
/// A missing directory is created (and yields an empty corpus) rather than
/// treated as an error, so a fresh deployment gets a usable drop-in folder.
pub async fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>, RagError> {
    if !dir.exists() {
        tokio::fs::create_dir_all(dir).await?;
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && is_supported(&path) {
            documents.push(path);
        }
    }
    documents.sort();
    Ok(documents)
}

/// Turns one document into embedded chunks and upserts them, replacing any
/// previous chunks for the same source.
#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            embedder,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Ingests `path` into `store`.
    ///
    /// Never returns an error: every failure in the extract/chunk/embed/
    /// upsert sequence is caught at this boundary and reported through
    /// `success = false` with a human-readable message.
    pub async fn ingest(&self, store: &dyn VectorBackend, path: &Path) -> IngestReport {
        let started = Instant::now();
        let source = source_name(path);
        let source_path = path.display().to_string();

        if path.as_os_str().is_empty() {
            return IngestReport::failure(
                source,
                source_path,
                "source path must be a non-empty string",
                started.elapsed().as_secs_f64(),
            );
        }

        match self.ingest_inner(store, path, &source, &source_path).await {
            Ok(0) => IngestReport::failure(
                &source,
                &source_path,
                format!("document '{source}' produced no chunks"),
                started.elapsed().as_secs_f64(),
            ),
            Ok(chunks_added) => {
                let duration_secs = started.elapsed().as_secs_f64();
                info!(source = %source, chunks_added, "ingested document");
                IngestReport {
                    success: true,
                    message: format!("document '{source}' processed successfully"),
                    source,
                    source_path,
                    chunks_added,
                    duration_secs,
                }
            }
            Err(err) => IngestReport::failure(
                &source,
                &source_path,
                format!("error processing document: {err}"),
                started.elapsed().as_secs_f64(),
            ),
        }
    }

    async fn ingest_inner(
        &self,
        store: &dyn VectorBackend,
        path: &Path,
        source: &str,
        source_path: &str,
    ) -> Result<usize, RagError> {
        let text = extract_text(path).await?;

        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embedder.embed_batch(&chunks).await?;

        // Best effort: the first ingestion of a new source has nothing to
        // delete, and a failed delete must not block re-ingestion. A genuine
        // storage failure here is still worth a warning so it is not
        // mistaken for the no-prior-chunks case.
        match store.delete_by_source(source).await {
            Ok(0) => {}
            Ok(removed) => info!(source = %source, removed, "replaced previous chunks"),
            Err(err) => {
                warn!(source = %source, error = %err, "failed to delete previous chunks")
            }
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| {
                ChunkRecord::new(source, source_path, chunk_index, content)
                    .with_embedding(embedding)
            })
            .collect();
        let chunks_added = records.len();
        store.upsert_chunks(records).await?;

        Ok(chunks_added)
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::SqliteChunkStore;
    use tempfile::tempdir;

    fn scratch_ingestor() -> Ingestor {
        let config = RagConfig {
            chunk_size: 120,
            chunk_overlap: 0,
            ..Default::default()
        };
        Ingestor::new(Arc::new(MockEmbeddingProvider::new()), &config)
    }

    #[tokio::test]
    async fn ingest_reports_missing_file_as_failure() {
        let dir = tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("chunks.sqlite"))
            .await
            .unwrap();

        let report = scratch_ingestor()
            .ingest(&store, Path::new("/nowhere/missing.txt"))
            .await;

        assert!(!report.success);
        assert_eq!(report.chunks_added, 0);
        assert!(report.message.contains("not found"), "{}", report.message);
    }

    #[tokio::test]
    async fn ingest_writes_gapless_chunk_indices() {
        let dir = tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("chunks.sqlite"))
            .await
            .unwrap();
        let doc = dir.path().join("case.txt");
        std::fs::write(&doc, format!("{}. {}. {}.", "a".repeat(90), "b".repeat(90), "c".repeat(90)))
            .unwrap();

        let report = scratch_ingestor().ingest(&store, &doc).await;

        assert!(report.success, "{}", report.message);
        assert!(report.chunks_added >= 2);
        let stored = store.chunks_by_source("case.txt").await.unwrap();
        let indices: Vec<usize> = stored.iter().map(|r| r.chunk_index).collect();
        assert_eq!(indices, (0..report.chunks_added).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn discovery_skips_unsupported_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "text").unwrap();
        std::fs::write(dir.path().join("two.md"), "text").unwrap();
        std::fs::write(dir.path().join("skip.bin"), "junk").unwrap();

        let documents = discover_documents(dir.path()).await.unwrap();
        let names: Vec<String> = documents
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["one.txt", "two.md"]);
    }

    #[tokio::test]
    async fn discovery_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("corpus");

        let documents = discover_documents(&missing).await.unwrap();
        assert!(documents.is_empty());
        assert!(missing.is_dir());
    }
}
