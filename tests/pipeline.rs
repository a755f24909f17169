//! End-to-end pipeline tests over the mock embedding provider and a
//! temporary SQLite database.

use std::sync::Arc;

use tempfile::tempdir;

use studyrag::config::RagConfig;
use studyrag::embeddings::{EmbeddingService, MockEmbeddingProvider};
use studyrag::ingestion::Ingestor;
use studyrag::retriever::Retriever;
use studyrag::store::{SqliteVectorStore, VectorStore};
use studyrag::types::{NewDocument, SourceType};

struct Pipeline {
    ingestor: Ingestor,
    retriever: Retriever,
    store: Arc<SqliteVectorStore>,
    // Keeps the database file alive for the duration of the test.
    _dir: tempfile::TempDir,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn pipeline() -> Pipeline {
    init_tracing();
    let dir = tempdir().unwrap();
    // A small chunk budget so the short test lecture splits into several chunks.
    let config = RagConfig {
        max_chunk_size: 100,
        chunk_overlap: 30,
        ..RagConfig::default()
    };
    let embedder = Arc::new(EmbeddingService::with_providers(vec![Arc::new(
        MockEmbeddingProvider::new(),
    )]));
    let store = Arc::new(
        SqliteVectorStore::open(dir.path().join("studyrag.db"))
            .await
            .unwrap(),
    );
    Pipeline {
        ingestor: Ingestor::new(&config, embedder.clone(), store.clone()),
        retriever: Retriever::new(embedder, store.clone()),
        store,
        _dir: dir,
    }
}

fn lecture_doc(id: &str) -> NewDocument {
    NewDocument::new(id, SourceType::Youtube, "vid-001", "Biology lecture")
}

const LECTURE: &str = "Photosynthesis converts light into chemical energy. \
    Chlorophyll absorbs mostly red and blue light. \
    The Calvin cycle fixes carbon dioxide into sugar. \
    Mitochondria later consume that sugar during respiration. \
    Cellular respiration releases the stored energy.";

#[tokio::test]
async fn ingest_then_retrieve_top_k() {
    let p = pipeline().await;

    let count = p
        .ingestor
        .ingest(lecture_doc("doc-1"), LECTURE)
        .await
        .unwrap();
    assert!(count >= 3);
    assert_eq!(p.store.count_chunks("doc-1").await.unwrap(), count);

    let top_k = 2;
    let context = p
        .retriever
        .retrieve_context("doc-1", "how does photosynthesis store energy?", top_k)
        .await
        .unwrap();
    assert_eq!(context.len(), top_k);

    // Same search through the store surfaces the scores: descending.
    let query = EmbeddingService::with_providers(vec![Arc::new(MockEmbeddingProvider::new())])
        .embed(&["how does photosynthesis store energy?".to_string()])
        .await
        .unwrap()
        .remove(0);
    let results = p.store.similarity_search("doc-1", &query, top_k).await.unwrap();
    if results.ranked {
        for pair in results.hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }
}

#[tokio::test]
async fn retrieval_is_scoped_per_document() {
    let p = pipeline().await;

    p.ingestor
        .ingest(lecture_doc("bio"), LECTURE)
        .await
        .unwrap();
    p.ingestor
        .ingest(
            NewDocument::new("history", SourceType::Pdf, "file.pdf", "History notes"),
            "The treaty of Westphalia ended the thirty years war. \
             It established the concept of state sovereignty.",
        )
        .await
        .unwrap();

    let context = p
        .retriever
        .retrieve_context("history", "what did the treaty establish?", 10)
        .await
        .unwrap();
    assert!(!context.is_empty());
    for chunk in &context {
        assert!(
            !chunk.contains("Photosynthesis"),
            "retrieval leaked a chunk from another document: {chunk}"
        );
    }
}

#[tokio::test]
async fn empty_document_yields_empty_context_not_error() {
    let p = pipeline().await;
    let context = p
        .retriever
        .retrieve_context("never-ingested", "anything", 5)
        .await
        .unwrap();
    assert!(context.is_empty());
}

#[tokio::test]
async fn deleting_a_document_empties_its_context() {
    let p = pipeline().await;
    p.ingestor
        .ingest(lecture_doc("doc-1"), LECTURE)
        .await
        .unwrap();
    let removed = p.store.delete_document("doc-1").await.unwrap();
    assert!(removed >= 1);

    let context = p
        .retriever
        .retrieve_context("doc-1", "photosynthesis", 5)
        .await
        .unwrap();
    assert!(context.is_empty());
}

#[tokio::test]
async fn joined_context_uses_the_prompt_separator() {
    let p = pipeline().await;
    p.ingestor
        .ingest(lecture_doc("doc-1"), LECTURE)
        .await
        .unwrap();

    let joined = p
        .retriever
        .retrieve_joined("doc-1", "energy", 3)
        .await
        .unwrap();
    let chunks = p
        .retriever
        .retrieve_context("doc-1", "energy", 3)
        .await
        .unwrap();
    if chunks.len() > 1 {
        assert!(joined.contains("\n\n---\n\n"));
    }
    assert!(!joined.is_empty());
}

#[tokio::test]
async fn distinct_documents_ingest_concurrently() {
    let p = pipeline().await;
    let a = p.ingestor.ingest(lecture_doc("doc-a"), LECTURE);
    let b = p.ingestor.ingest(
        NewDocument::new("doc-b", SourceType::Pdf, "notes.pdf", "Notes"),
        "Completely different material. Also split into sentences.",
    );
    let (count_a, count_b) = tokio::join!(a, b);
    assert!(count_a.unwrap() >= 1);
    assert!(count_b.unwrap() >= 1);
}

#[tokio::test]
async fn reingesting_a_document_replaces_its_chunks() {
    let p = pipeline().await;
    p.ingestor
        .ingest(lecture_doc("doc-1"), LECTURE)
        .await
        .unwrap();
    let count = p
        .ingestor
        .ingest(lecture_doc("doc-1"), "A single replacement sentence.")
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(p.store.count_chunks("doc-1").await.unwrap(), 1);
}
