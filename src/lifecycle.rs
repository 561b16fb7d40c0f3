//! Vectorstore lifecycle: lazy once-per-process initialization, corruption
//! recovery, and explicit reset.
//!
//! The manager is an explicitly constructed, injected object; it owns the
//! only handle to the persisted store and the only right to delete or
//! rebuild the persistence directory. A single `tokio::sync::Mutex` is held
//! across the whole load-or-build sequence, so two tasks racing through a
//! cold start cannot both rebuild the directory.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::ingestion::{Ingestor, discover_documents};
use crate::stores::SqliteChunkStore;
use crate::types::RagError;

enum ManagerState {
    Uninitialized,
    Ready(Arc<SqliteChunkStore>),
    Failed,
}

/// Owns the process-wide handle to the persisted vector index.
///
/// Lifecycle: uninitialized until first use; the first `get_or_create`
/// either loads the persisted index or builds it from the source corpus.
/// A corrupt persisted index is deleted and rebuilt; a failed build is
/// retried exactly once. `reset` discards the handle and deletes the
/// persistence directory.
pub struct VectorstoreManager {
    config: RagConfig,
    ingestor: Ingestor,
    state: Mutex<ManagerState>,
}

impl VectorstoreManager {
    pub fn new(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let ingestor = Ingestor::new(embedder, &config);
        Self {
            config,
            ingestor,
            state: Mutex::new(ManagerState::Uninitialized),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// `true` once a usable handle is cached.
    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, ManagerState::Ready(_))
    }

    /// Returns the cached store handle, initializing it on first use.
    ///
    /// The cached handle is returned without re-checking persisted storage;
    /// this is a cached singleton, not a freshness check. Fails with
    /// [`RagError::NoSourceDocuments`] when there is neither a persisted
    /// index nor anything to build one from, and [`RagError::BuildFailed`]
    /// when building from the corpus fails twice.
    pub async fn get_or_create(&self) -> Result<Arc<SqliteChunkStore>, RagError> {
        let mut state = self.state.lock().await;
        match &*state {
            ManagerState::Ready(store) => return Ok(store.clone()),
            ManagerState::Failed => {
                debug!("retrying vectorstore initialization after earlier failure")
            }
            ManagerState::Uninitialized => {}
        }

        info!("initializing vectorstore");
        match self.load_or_build().await {
            Ok(store) => {
                *state = ManagerState::Ready(store.clone());
                Ok(store)
            }
            Err(err) => {
                *state = ManagerState::Failed;
                Err(err)
            }
        }
    }

    /// Opens (or creates) the store without requiring a source corpus.
    ///
    /// Used by the ingestion tool: an empty corpus is not an error there,
    /// the store starts empty and is populated by the caller.
    pub async fn get_or_create_empty(&self) -> Result<Arc<SqliteChunkStore>, RagError> {
        let mut state = self.state.lock().await;
        if let ManagerState::Ready(store) = &*state {
            return Ok(store.clone());
        }

        if let Some(store) = self.try_load_existing().await {
            *state = ManagerState::Ready(store.clone());
            return Ok(store);
        }

        tokio::fs::create_dir_all(&self.config.persist_dir).await?;
        match SqliteChunkStore::open(self.config.db_path()).await {
            Ok(store) => {
                let store = Arc::new(store);
                *state = ManagerState::Ready(store.clone());
                info!("created empty vectorstore");
                Ok(store)
            }
            Err(err) => {
                *state = ManagerState::Failed;
                Err(err)
            }
        }
    }

    /// Discards the cached handle and deletes the persistence directory.
    /// The next `get_or_create` rebuilds from the source corpus.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = ManagerState::Uninitialized;
        if let Err(err) = self.clean_persist_dir().await {
            warn!(error = %err, "failed to clean persistence directory during reset");
        }
        info!("vectorstore reset");
    }

    async fn load_or_build(&self) -> Result<Arc<SqliteChunkStore>, RagError> {
        if let Some(store) = self.try_load_existing().await {
            return Ok(store);
        }
        self.build_from_corpus().await
    }

    /// Tries to open a previously persisted index. A corruption-classified
    /// failure deletes the directory; any other failure is treated as "no
    /// index yet". Both fall through to a corpus build.
    async fn try_load_existing(&self) -> Option<Arc<SqliteChunkStore>> {
        if !dir_is_nonempty(&self.config.persist_dir) {
            return None;
        }

        match SqliteChunkStore::open(self.config.db_path()).await {
            Ok(store) => {
                info!("loaded existing vectorstore from persistence");
                Some(Arc::new(store))
            }
            Err(err) if err.is_corruption() => {
                warn!(error = %err, "persisted vectorstore is corrupt, cleaning");
                if let Err(clean_err) = self.clean_persist_dir().await {
                    warn!(error = %clean_err, "failed to clean corrupt persistence directory");
                }
                None
            }
            Err(err) => {
                warn!(error = %err, "could not load persisted vectorstore, rebuilding");
                None
            }
        }
    }

    async fn build_from_corpus(&self) -> Result<Arc<SqliteChunkStore>, RagError> {
        let documents = discover_documents(&self.config.source_dir).await?;
        if documents.is_empty() {
            return Err(self.no_source_documents());
        }
        info!(
            documents = documents.len(),
            source_dir = %self.config.source_dir.display(),
            "building vectorstore from corpus"
        );

        match self.build_once(&documents).await {
            Ok(store) => Ok(store),
            Err(err @ RagError::NoSourceDocuments { .. }) => Err(err),
            Err(err) => {
                warn!(error = %err, "vectorstore build failed, retrying once");
                self.build_once(&documents)
                    .await
                    .map_err(|retry_err| RagError::BuildFailed(retry_err.to_string()))
            }
        }
    }

    async fn build_once(&self, documents: &[std::path::PathBuf]) -> Result<Arc<SqliteChunkStore>, RagError> {
        self.clean_persist_dir().await?;
        tokio::fs::create_dir_all(&self.config.persist_dir).await?;

        let store = Arc::new(SqliteChunkStore::open(self.config.db_path()).await?);

        let mut ingested = 0usize;
        let mut chunks_written = 0usize;
        for document in documents {
            let report = self.ingestor.ingest(store.as_ref(), document).await;
            if report.success {
                ingested += 1;
                chunks_written += report.chunks_added;
            } else {
                // Document-level failures are skip-and-continue during a
                // corpus build.
                warn!(source = %report.source, message = %report.message, "skipping document");
            }
        }

        if ingested == 0 {
            return Err(self.no_source_documents());
        }
        info!(ingested, chunks_written, "vectorstore build complete");
        Ok(store)
    }

    async fn clean_persist_dir(&self) -> Result<(), RagError> {
        let dir = &self.config.persist_dir;
        if dir.exists() {
            info!(dir = %dir.display(), "cleaning persistence directory");
            tokio::fs::remove_dir_all(dir).await?;
        }
        Ok(())
    }

    fn no_source_documents(&self) -> RagError {
        let resolved = self
            .config
            .source_dir
            .canonicalize()
            .unwrap_or_else(|_| self.config.source_dir.clone());
        RagError::NoSourceDocuments {
            dir: resolved.display().to_string(),
        }
    }
}

fn dir_is_nonempty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
