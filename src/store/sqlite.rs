//! SQLite-backed vector store using the `sqlite-vec` extension.
//!
//! Embeddings are stored as JSON text and compared with
//! `vec_distance_cosine(vec_f32(...), vec_f32(?))`. The extension is
//! registered process-wide once; if registration or the version probe fails
//! the store still opens, with similarity search running in degraded
//! stored-order mode.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{Connection, OptionalExtension, ffi};
use tracing::warn;

use crate::types::{Document, RagError, SourceType};

use super::{ChunkRecord, SearchHit, SearchResults, VectorStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id          TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id   TEXT NOT NULL,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chunks (
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content     TEXT NOT NULL,
    embedding   TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (document_id, chunk_index)
);
";

#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
    vector_search: bool,
}

impl SqliteVectorStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    ///
    /// A failed `sqlite-vec` probe downgrades similarity search to the
    /// unranked fallback instead of failing the open.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let vec_registered = register_sqlite_vec().is_ok();

        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::StoreWrite(err.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::StoreWrite(err.to_string()))?;

        let vector_search = vec_registered && Self::probe_vec(&conn).await;
        if !vector_search {
            warn!("sqlite-vec unavailable, similarity search degrades to stored-order retrieval");
        }

        Ok(Self {
            conn,
            vector_search,
        })
    }

    /// In-memory store, mainly for tests and examples.
    pub async fn open_in_memory() -> Result<Self, RagError> {
        let vec_registered = register_sqlite_vec().is_ok();
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| RagError::StoreWrite(err.to_string()))?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::StoreWrite(err.to_string()))?;
        let vector_search = vec_registered && Self::probe_vec(&conn).await;
        Ok(Self {
            conn,
            vector_search,
        })
    }

    /// Forces ranked vector search on or off. Turning it off exercises the
    /// degraded retrieval path without uninstalling the extension.
    #[must_use]
    pub fn with_vector_search(mut self, enabled: bool) -> Self {
        self.vector_search = enabled;
        self
    }

    /// Whether ranked nearest-neighbor search is available.
    pub fn vector_search_enabled(&self) -> bool {
        self.vector_search
    }

    async fn probe_vec(conn: &Connection) -> bool {
        conn.call(|conn| {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .is_ok()
    }

    async fn ranked_search(
        &self,
        document_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, RagError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::StoreQuery(err.to_string()))?;
        let document_id = document_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT content, \
                         vec_distance_cosine(vec_f32(embedding), vec_f32(?2)) AS distance \
                         FROM chunks WHERE document_id = ?1 \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&document_id, &embedding_json], |row| {
                        let content: String = row.get(0)?;
                        let distance: f32 = row.get(1)?;
                        Ok(SearchHit {
                            content,
                            similarity: 1.0 - distance,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| RagError::StoreQuery(err.to_string()))
    }

    /// Degraded retrieval: the first `top_k` chunks in stored order, unranked.
    async fn fetch_top_by_index(
        &self,
        document_id: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, RagError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT content FROM chunks WHERE document_id = ?1 \
                         ORDER BY chunk_index ASC LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&document_id], |row| {
                        let content: String = row.get(0)?;
                        Ok(SearchHit {
                            content,
                            similarity: 0.0,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| RagError::StoreQuery(err.to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_document(
        &self,
        document: &Document,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), RagError> {
        let doc = document.clone();
        // Serialize outside the connection thread so a bad row fails early.
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding_json = serde_json::to_string(&chunk.embedding)
                .map_err(|err| RagError::StoreWrite(err.to_string()))?;
            rows.push((
                chunk.chunk_index as i64,
                chunk.content,
                embedding_json,
                chunk.metadata.to_string(),
            ));
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "INSERT OR REPLACE INTO documents \
                     (id, source_type, source_id, title, content, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    [
                        &doc.id,
                        &doc.source_type.as_str().to_string(),
                        &doc.source_id,
                        &doc.title,
                        &doc.content,
                        &doc.created_at.to_rfc3339(),
                    ],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute("DELETE FROM chunks WHERE document_id = ?1", [&doc.id])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                for (chunk_index, content, embedding, metadata) in &rows {
                    tx.execute(
                        "INSERT INTO chunks \
                         (document_id, chunk_index, content, embedding, metadata) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        (&doc.id, chunk_index, content, embedding, metadata),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::StoreWrite(err.to_string()))
    }

    async fn similarity_search(
        &self,
        document_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<SearchResults, RagError> {
        if self.vector_search {
            match self.ranked_search(document_id, query_embedding, top_k).await {
                Ok(hits) => {
                    return Ok(SearchResults { hits, ranked: true });
                }
                Err(err) => {
                    warn!(
                        document_id,
                        error = %err,
                        "ranked similarity search failed, falling back to stored order"
                    );
                }
            }
        }

        let hits = self.fetch_top_by_index(document_id, top_k).await?;
        Ok(SearchResults {
            hits,
            ranked: false,
        })
    }

    async fn fetch_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, RagError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT chunk_index, content, embedding, metadata \
                         FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&document_id], |row| {
                        let chunk_index: i64 = row.get(0)?;
                        let content: String = row.get(1)?;
                        let embedding: String = row.get(2)?;
                        let metadata: String = row.get(3)?;
                        Ok(ChunkRecord {
                            chunk_index: chunk_index as usize,
                            content,
                            embedding: serde_json::from_str(&embedding).unwrap_or_default(),
                            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut chunks = Vec::new();
                for row in rows {
                    chunks.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(chunks)
            })
            .await
            .map_err(|err| RagError::StoreQuery(err.to_string()))
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, RagError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT id, source_type, source_id, title, content, created_at \
                         FROM documents WHERE id = ?1",
                        [&document_id],
                        |row| {
                            let source_raw: String = row.get(1)?;
                            let created_raw: String = row.get(5)?;
                            Ok(Document {
                                id: row.get(0)?,
                                source_type: source_raw
                                    .parse()
                                    .unwrap_or(SourceType::Pdf),
                                source_id: row.get(2)?,
                                title: row.get(3)?,
                                content: row.get(4)?,
                                created_at: DateTime::parse_from_rfc3339(&created_raw)
                                    .map(|dt| dt.with_timezone(&Utc))
                                    .unwrap_or(DateTime::UNIX_EPOCH),
                            })
                        },
                    )
                    .optional()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(result)
            })
            .await
            .map_err(|err| RagError::StoreQuery(err.to_string()))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                let removed = tx
                    .execute("DELETE FROM chunks WHERE document_id = ?1", [&document_id])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute("DELETE FROM documents WHERE id = ?1", [&document_id])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(removed)
            })
            .await
            .map_err(|err| RagError::StoreWrite(err.to_string()))
    }

    async fn count_chunks(&self, document_id: &str) -> Result<usize, RagError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                        [&document_id],
                        |row| row.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::StoreQuery(err.to_string()))
    }
}

fn register_sqlite_vec() -> Result<(), String> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
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
}
