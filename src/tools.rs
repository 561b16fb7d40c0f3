//! Tool-facing surface: exactly two operations, "ingest one document" and
//! "query with top-k", each returning a structured result object and never
//! a raised error.

use std::path::Path;
use std::sync::Arc;

use tracing::error;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::generation::GenerationProvider;
use crate::ingestion::Ingestor;
use crate::lifecycle::VectorstoreManager;
use crate::retrieval::RagPipeline;
use crate::types::{IngestReport, RagAnswer, RagError, SearchResponse};

/// Bundles the lifecycle manager, ingestor, and pipeline behind the two
/// tool operations external agents call.
pub struct RagToolkit {
    manager: Arc<VectorstoreManager>,
    ingestor: Ingestor,
    pipeline: RagPipeline,
}

impl RagToolkit {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let manager = Arc::new(VectorstoreManager::new(config.clone(), embedder.clone()));
        let ingestor = Ingestor::new(embedder.clone(), &config);
        let pipeline = RagPipeline::new(manager.clone(), embedder, generator);
        Self {
            manager,
            ingestor,
            pipeline,
        }
    }

    /// The lifecycle manager backing this toolkit.
    pub fn manager(&self) -> &Arc<VectorstoreManager> {
        &self.manager
    }

    /// Adds one document to the knowledge base, replacing any previous
    /// chunks for the same source. Always returns a report, never an error.
    pub async fn add_document(&self, path: impl AsRef<Path>) -> IngestReport {
        let path = path.as_ref();
        let store = match self.manager.get_or_create().await {
            Ok(store) => store,
            // Ingesting the very first document is how an empty deployment
            // bootstraps: an empty corpus is not a failure here.
            Err(RagError::NoSourceDocuments { .. }) => {
                match self.manager.get_or_create_empty().await {
                    Ok(store) => store,
                    Err(err) => return failed_report(path, err),
                }
            }
            Err(err) => return failed_report(path, err),
        };
        self.ingestor.ingest(store.as_ref(), path).await
    }

    /// Retrieves the `top_k` most similar chunks as a structured payload.
    pub async fn query(&self, query: &str, top_k: usize) -> SearchResponse {
        self.pipeline.search(query, top_k).await
    }

    /// Full retrieval-augmented answer for a query.
    pub async fn answer(&self, query: &str) -> RagAnswer {
        self.pipeline.answer(query).await
    }
}

fn failed_report(path: &Path, err: RagError) -> IngestReport {
    error!(path = %path.display(), error = %err, "could not obtain vectorstore for ingestion");
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    IngestReport::failure(
        source,
        path.display().to_string(),
        format!("error processing document: {err}"),
        0.0,
    )
}
