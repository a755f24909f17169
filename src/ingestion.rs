//! Document ingestion: clean → chunk → embed → atomic upsert.
//!
//! One [`Ingestor`] serves concurrent requests; ingestion of distinct
//! documents and all retrievals proceed in parallel, but a second ingestion of
//! a document that is still in flight is rejected rather than allowed to
//! interleave writes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

use crate::chunking::chunk_text;
use crate::config::RagConfig;
use crate::embeddings::EmbeddingService;
use crate::store::{ChunkRecord, VectorStore};
use crate::types::{Document, NewDocument, RagError};

pub struct Ingestor {
    config: RagConfig,
    embedder: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    in_flight: Mutex<HashSet<String>>,
}

impl Ingestor {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config: config.clone(),
            embedder,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Ingests `raw_text` as the content of a new document and returns the
    /// number of chunks stored.
    ///
    /// Zero chunks (empty or whitespace-only text after cleaning) fail with
    /// [`RagError::Chunking`] before any embedding tier is invoked.
    pub async fn ingest(&self, new: NewDocument, raw_text: &str) -> Result<usize, RagError> {
        let _guard = self.claim(&new.id)?;

        let chunks = chunk_text(raw_text, self.config.max_chunk_size, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(RagError::Chunking(format!(
                "no chunks generated from content of document '{}'",
                new.id
            )));
        }

        let embeddings = self.embedder.embed(&chunks).await?;

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| ChunkRecord::new(index, content.clone(), embedding))
            .collect();

        let document = Document {
            id: new.id.clone(),
            source_type: new.source_type,
            source_id: new.source_id,
            title: new.title,
            content: raw_text.to_string(),
            created_at: Utc::now(),
        };

        let chunk_count = records.len();
        self.store.upsert_document(&document, records).await?;

        info!(
            document_id = %document.id,
            source_type = document.source_type.as_str(),
            chunks = chunk_count,
            "document ingested"
        );
        Ok(chunk_count)
    }

    /// Marks `document_id` as in flight, rejecting concurrent ingestion of the
    /// same document. The claim is released when the guard drops.
    fn claim(&self, document_id: &str) -> Result<IngestClaim<'_>, RagError> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(document_id.to_string()) {
            return Err(RagError::IngestionInProgress(document_id.to_string()));
        }
        Ok(IngestClaim {
            in_flight: &self.in_flight,
            document_id: document_id.to_string(),
        })
    }
}

struct IngestClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    document_id: String,
}

impl Drop for IngestClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.document_id);
    }
}
