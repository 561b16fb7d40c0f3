//! SQLite-backed chunk store with vector search via `sqlite-vec`.
//!
//! Chunks live in a plain `chunks` table; embeddings are stored as JSON
//! arrays in `chunk_embeddings` and compared with `vec_distance_cosine`.
//! The store owns corruption classification: every surfaced error carries a
//! typed [`StorageErrorKind`] derived from sqlite's failure phrasing, so the
//! lifecycle manager never matches on message text itself.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi};

use super::{ChunkRecord, VectorBackend};
use crate::types::{RagError, StorageErrorKind};

/// Message fragments that mark a persisted index as corrupt rather than
/// merely errored. Matched case-insensitively.
const CORRUPTION_MARKERS: &[&str] = &[
    "disk i/o error",
    "database error",
    "error getting collection",
    "database disk image is malformed",
    "file is not a database",
    "not a database",
];

fn classify_message(message: &str) -> StorageErrorKind {
    let lowered = message.to_lowercase();
    if CORRUPTION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        StorageErrorKind::Corruption
    } else {
        StorageErrorKind::Other
    }
}

fn storage_error(err: tokio_rusqlite::Error) -> RagError {
    let message = err.to_string();
    RagError::Storage {
        kind: classify_message(&message),
        message,
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    source_path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    id TEXT PRIMARY KEY,
    embedding TEXT NOT NULL
);
";

/// Persisted chunk store over SQLite with the `sqlite-vec` extension.
#[derive(Clone, Debug)]
pub struct SqliteChunkStore {
    conn: Connection,
}

impl SqliteChunkStore {
    /// Opens (or creates) the database at `path` and prepares the schema.
    ///
    /// Opening an existing file exercises the schema, so a corrupt database
    /// surfaces here as a [`StorageErrorKind::Corruption`] error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path).await.map_err(storage_error)?;

        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(tokio_rusqlite::Error::Rusqlite(err)),
            }
        })
        .await
        .map_err(storage_error)?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(storage_error)?;

        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *const c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::storage)
    }
}

#[async_trait]
impl VectorBackend for SqliteChunkStore {
    async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let Some(embedding) = chunk.embedding.as_ref() else {
                continue;
            };
            let embedding_json = serde_json::to_string(embedding)
                .map_err(|err| RagError::storage(err.to_string()))?;
            rows.push((
                chunk.id,
                chunk.source,
                chunk.source_path,
                chunk.chunk_index as i64,
                chunk.content,
                embedding_json,
            ));
        }

        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                for (id, source, source_path, chunk_index, content, embedding_json) in rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO chunks (id, source, source_path, chunk_index, content) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        (&id, &source, &source_path, chunk_index, &content),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute(
                        "INSERT OR REPLACE INTO chunk_embeddings (id, embedding) VALUES (?1, ?2)",
                        (&id, &embedding_json),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(storage_error)
    }

    async fn chunks_by_source(&self, source: &str) -> Result<Vec<ChunkRecord>, RagError> {
        let source = source.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, source, source_path, chunk_index, content FROM chunks \
                         WHERE source = ?1 ORDER BY chunk_index ASC",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&source], |row| {
                        Ok(ChunkRecord {
                            id: row.get(0)?,
                            source: row.get(1)?,
                            source_path: row.get(2)?,
                            chunk_index: row.get::<_, i64>(3)?.max(0) as usize,
                            content: row.get(4)?,
                            embedding: None,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut records = Vec::new();
                for row in rows {
                    records.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(records)
            })
            .await
            .map_err(storage_error)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, RagError> {
        let source = source.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "DELETE FROM chunk_embeddings WHERE id IN \
                     (SELECT id FROM chunks WHERE source = ?1)",
                    [&source],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let deleted = tx
                    .execute("DELETE FROM chunks WHERE source = ?1", [&source])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(deleted)
            })
            .await
            .map_err(storage_error)
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::storage(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.id, c.source, c.source_path, c.chunk_index, c.content, \
                         vec_distance_cosine(vec_f32(e.embedding), vec_f32(?1)) AS distance \
                         FROM chunks c \
                         JOIN chunk_embeddings e ON c.id = e.id \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&embedding_json], |row| {
                        let record = ChunkRecord {
                            id: row.get(0)?,
                            source: row.get(1)?,
                            source_path: row.get(2)?,
                            chunk_index: row.get::<_, i64>(3)?.max(0) as usize,
                            content: row.get(4)?,
                            embedding: None,
                        };
                        let distance: f32 = row.get(5)?;
                        Ok((record, distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(storage_error)
    }

    async fn count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(source: &str, idx: usize, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord::new(source, format!("/tmp/{source}"), idx, content).with_embedding(embedding)
    }

    async fn open_scratch_store(dir: &tempfile::TempDir) -> SqliteChunkStore {
        SqliteChunkStore::open(dir.path().join("chunks.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_id() {
        let dir = tempdir().unwrap();
        let store = open_scratch_store(&dir).await;

        let chunks = vec![
            record("case.txt", 0, "first", vec![1.0, 0.0]),
            record("case.txt", 1, "second", vec![0.0, 1.0]),
        ];
        store.upsert_chunks(chunks.clone()).await.unwrap();
        store.upsert_chunks(chunks).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn chunks_by_source_orders_by_index() {
        let dir = tempdir().unwrap();
        let store = open_scratch_store(&dir).await;

        store
            .upsert_chunks(vec![
                record("case.txt", 2, "third", vec![0.5, 0.5]),
                record("case.txt", 0, "first", vec![1.0, 0.0]),
                record("case.txt", 1, "second", vec![0.0, 1.0]),
                record("other.txt", 0, "unrelated", vec![0.2, 0.8]),
            ])
            .await
            .unwrap();

        let records = store.chunks_by_source("case.txt").await.unwrap();
        let indices: Vec<usize> = records.iter().map(|r| r.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn delete_by_source_removes_only_that_source() {
        let dir = tempdir().unwrap();
        let store = open_scratch_store(&dir).await;

        store
            .upsert_chunks(vec![
                record("case.txt", 0, "first", vec![1.0, 0.0]),
                record("other.txt", 0, "unrelated", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_source("case.txt").await.unwrap(), 1);
        assert_eq!(store.delete_by_source("case.txt").await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() {
        let dir = tempdir().unwrap();
        let store = open_scratch_store(&dir).await;

        store
            .upsert_chunks(vec![
                record("case.txt", 0, "aligned", vec![1.0, 0.0]),
                record("case.txt", 1, "nearby", vec![0.9, 0.1]),
                record("case.txt", 2, "orthogonal", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search_similar(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0.content, "aligned");
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "distances must ascend");
        }
    }

    #[tokio::test]
    async fn search_clamps_k_to_stored_records() {
        let dir = tempdir().unwrap();
        let store = open_scratch_store(&dir).await;

        store
            .upsert_chunks(vec![record("case.txt", 0, "only", vec![1.0, 0.0])])
            .await
            .unwrap();

        let results = store.search_similar(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn opening_garbage_file_classifies_as_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.sqlite");
        std::fs::write(&path, b"this is not a sqlite database at all").unwrap();

        let err = SqliteChunkStore::open(&path).await.unwrap_err();
        assert!(err.is_corruption(), "got {err:?}");
    }

    #[test]
    fn corruption_markers_cover_reference_phrases() {
        assert_eq!(
            classify_message("sqlite: disk I/O error"),
            StorageErrorKind::Corruption
        );
        assert_eq!(
            classify_message("Error getting collection 'chunks'"),
            StorageErrorKind::Corruption
        );
        assert_eq!(
            classify_message("UNIQUE constraint failed"),
            StorageErrorKind::Other
        );
    }
}
