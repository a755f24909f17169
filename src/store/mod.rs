//! Storage contract for chunk+vector persistence and similarity search.
//!
//! The [`VectorStore`] trait keeps the pipeline independent of the concrete
//! engine. The bundled implementation is SQLite with `sqlite-vec`
//! ([`sqlite::SqliteVectorStore`]); the same contract fits a pgvector-backed
//! store.
//!
//! Two guarantees matter to callers:
//!
//! * **Atomic upsert** — all chunk rows for a document are written in one
//!   transaction or none are; readers never observe a partially ingested
//!   document.
//! * **Degraded search** — when the nearest-neighbor mechanism is
//!   unavailable, [`VectorStore::similarity_search`] returns the first `top_k`
//!   chunks in stored order with [`SearchResults::ranked`] set to `false`
//!   instead of failing.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Document, RagError};

pub use sqlite::SqliteVectorStore;

/// A chunk with its embedding, ready for persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Zero-based ordinal, contiguous and unique within a document.
    pub chunk_index: usize,
    pub content: String,
    /// Normalized vector at the pipeline's fixed dimensionality.
    pub embedding: Vec<f32>,
    /// Open key-value map for provenance (page numbers, timestamps, ...).
    pub metadata: serde_json::Value,
}

impl ChunkRecord {
    pub fn new(chunk_index: usize, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            chunk_index,
            content: content.into(),
            embedding,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One retrieved chunk with its cosine similarity to the query.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub content: String,
    pub similarity: f32,
}

/// Result of a similarity search.
///
/// `ranked` is `false` when the store fell back to stored-order retrieval
/// because the nearest-neighbor mechanism was unavailable; scores are zero in
/// that case and callers should not treat the ordering as relevance.
#[derive(Clone, Debug)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub ranked: bool,
}

/// Database-agnostic persistence and retrieval of chunked documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists a document and its chunk rows atomically, replacing any prior
    /// chunks for the same document id.
    async fn upsert_document(
        &self,
        document: &Document,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), RagError>;

    /// Nearest-neighbor search scoped to one document, most similar first.
    ///
    /// Never returns chunks belonging to another document. Degrades to
    /// unranked stored-order retrieval when vector search is unavailable.
    async fn similarity_search(
        &self,
        document_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<SearchResults, RagError>;

    /// All chunks of a document in natural (chunk_index) order.
    async fn fetch_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, RagError>;

    /// Fetches a stored document by id.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, RagError>;

    /// Deletes a document and cascades to all of its chunks. Returns the
    /// number of chunk rows removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, RagError>;

    /// Number of chunk rows stored for a document.
    async fn count_chunks(&self, document_id: &str) -> Result<usize, RagError>;
}
