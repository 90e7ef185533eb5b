//! SQLite-backed [`VectorStore`]: a `tokio_rusqlite` connection with the
//! `sqlite-vec` extension loaded once per process, scored via
//! `vec_distance_cosine`.

use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::Connection;
use tracing::instrument;

use crate::embedder::Embedder;
use crate::error::RagError;

use super::vector::{FlatMetadata, VectorStore};

static SQLITE_VEC_INIT: Once = Once::new();

/// Registers the `sqlite-vec` extension's entry point once per process.
/// Registration failure is a fatal initialization error, so it panics
/// rather than silently falling back to a broken connection.
fn register_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    });
}

/// Default vector dimensionality; must match the configured [`Embedder`].
const DEFAULT_DIMS: usize = 32;

/// SQLite + `sqlite-vec` backed vector store, the crate's shipped default.
pub struct SqliteVectorStore {
    conn: Connection,
    embedder: std::sync::Arc<dyn Embedder>,
    dims: usize,
}

impl SqliteVectorStore {
    /// Open (creating if absent) a SQLite database at `path` and ensure the
    /// `chunks` table and its `sqlite-vec` virtual table exist.
    pub async fn open(
        path: impl AsRef<std::path::Path>,
        embedder: std::sync::Arc<dyn Embedder>,
        dims: usize,
    ) -> Result<Self, RagError> {
        register_sqlite_vec();
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;
        let store = Self { conn, embedder, dims };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database, useful for hermetic integration tests
    /// that still want to exercise the real SQL path.
    pub async fn open_in_memory(
        embedder: std::sync::Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        Self::open(":memory:", embedder, DEFAULT_DIMS).await
    }

    async fn ensure_schema(&self) -> Result<(), RagError> {
        let dims = self.dims;
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS chunks (
                        chunk_id TEXT PRIMARY KEY,
                        text TEXT NOT NULL,
                        metadata TEXT NOT NULL
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors USING vec0(
                        chunk_id TEXT PRIMARY KEY,
                        embedding FLOAT[{dims}]
                    );"
                ))?;
                Ok(())
            })
            .await
            .map_err(|e| RagError::Storage(e.to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(level = "trace", skip_all, fields(chunk_id = chunk_id))]
    async fn upsert(&self, chunk_id: &str, text: &str, flat_metadata: FlatMetadata) -> Result<(), RagError> {
        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default();
        let metadata_json = serde_json::to_string(&flat_metadata)?;
        let embedding_bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();

        let chunk_id = chunk_id.to_string();
        let text = text.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO chunks (chunk_id, text, metadata) VALUES (?1, ?2, ?3)
                     ON CONFLICT(chunk_id) DO UPDATE SET text = excluded.text, metadata = excluded.metadata",
                    rusqlite::params![chunk_id, text, metadata_json],
                )?;
                conn.execute(
                    "INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?1, ?2)
                     ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding",
                    rusqlite::params![chunk_id, embedding_bytes],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| RagError::Storage(e.to_string()))
    }

    #[instrument(level = "trace", skip_all)]
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&FlatMetadata>,
    ) -> Result<Vec<(String, f64, String, FlatMetadata)>, RagError> {
        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default();
        let embedding_bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();

        let rows: Vec<(String, f64, String, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.chunk_id, v.distance, c.text, c.metadata
                     FROM chunk_vectors v
                     JOIN chunks c ON c.chunk_id = v.chunk_id
                     WHERE v.embedding MATCH ?1 AND k = ?2
                     ORDER BY v.distance ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![embedding_bytes, k as i64], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;

        let out = rows
            .into_iter()
            .map(|(chunk_id, distance, text, metadata_json)| {
                let flat: FlatMetadata = serde_json::from_str(&metadata_json).unwrap_or_default();
                (chunk_id, distance, text, flat)
            })
            .filter(|(_, _, _, flat)| filter.is_none_or(|f| f.iter().all(|(k, v)| flat.get(k) == Some(v))))
            .collect();
        Ok(out)
    }

    async fn delete(&self, chunk_id: &str) -> Result<(), RagError> {
        let chunk_id = chunk_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM chunks WHERE chunk_id = ?1", rusqlite::params![chunk_id])?;
                conn.execute(
                    "DELETE FROM chunk_vectors WHERE chunk_id = ?1",
                    rusqlite::params![chunk_id],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| RagError::Storage(e.to_string()))
    }

    async fn delete_by_filter(&self, filter: &FlatMetadata) -> Result<(), RagError> {
        let filter = filter.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT chunk_id, metadata FROM chunks")?;
                let matching: Vec<String> = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .filter_map(|r| r.ok())
                    .filter(|(_, metadata_json)| {
                        let flat: FlatMetadata = serde_json::from_str(metadata_json).unwrap_or_default();
                        filter.iter().all(|(k, v)| flat.get(k) == Some(v))
                    })
                    .map(|(chunk_id, _)| chunk_id)
                    .collect();
                for chunk_id in matching {
                    conn.execute("DELETE FROM chunks WHERE chunk_id = ?1", rusqlite::params![chunk_id])?;
                    conn.execute(
                        "DELETE FROM chunk_vectors WHERE chunk_id = ?1",
                        rusqlite::params![chunk_id],
                    )?;
                }
                Ok(())
            })
            .await
            .map_err(|e| RagError::Storage(e.to_string()))
    }
}
