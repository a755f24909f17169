//! Query-time retrieval: embed the query, search the store, assemble context.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embeddings::EmbeddingService;
use crate::store::VectorStore;
use crate::types::RagError;

/// Separator used when rendering retrieved chunks into a single prompt block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Retrieves the chunks of one document most relevant to a query.
pub struct Retriever {
    embedder: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<EmbeddingService>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Returns up to `top_k` chunk contents for `document_id`, most similar to
    /// `query` first. Scores are dropped at this layer.
    ///
    /// An empty result is a valid non-error outcome; the generation layer is
    /// responsible for substituting its own "no relevant context" marker.
    pub async fn retrieve_context(
        &self,
        document_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, RagError> {
        let query_embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_embedding) = query_embeddings.into_iter().next() else {
            return Err(RagError::NoEmbeddingProvider(
                "embedding service produced no vector for the query".to_string(),
            ));
        };

        let results = self
            .store
            .similarity_search(document_id, &query_embedding, top_k)
            .await?;

        if !results.ranked && !results.hits.is_empty() {
            warn!(
                document_id,
                "serving unranked fallback context; relevance is not guaranteed"
            );
        }
        debug!(document_id, hits = results.hits.len(), "retrieved context");

        Ok(results.hits.into_iter().map(|hit| hit.content).collect())
    }

    /// Like [`retrieve_context`](Self::retrieve_context) but renders the
    /// chunks into one separator-joined block ready for prompt interpolation.
    pub async fn retrieve_joined(
        &self,
        document_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<String, RagError> {
        let chunks = self.retrieve_context(document_id, query, top_k).await?;
        Ok(chunks.join(CONTEXT_SEPARATOR))
    }
}
