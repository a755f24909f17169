//! # studyrag
//!
//! Retrieval-augmented-generation plumbing for study documents: split long
//! transcripts and PDF text into overlapping sentence-bounded chunks, embed
//! them through a prioritized chain of providers, persist chunk+vector rows,
//! and retrieve the best-matching chunks to ground a downstream generation
//! call.
//!
//! ```text
//! Raw cleaned text ──► chunking ──► embeddings (tiered fallback) ──┐
//!                                                                  │
//!                                       stores ◄── atomic upsert ──┘
//!                                         │
//! Query ──► embeddings (batch of one) ──► similarity search ──► context
//! ```
//!
//! The generation layer, the web/API surface, and transcript/PDF extraction
//! are external collaborators; this crate starts at cleaned text and ends at
//! an ordered list of context strings.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use studyrag::config::RagConfig;
//! use studyrag::embeddings::EmbeddingService;
//! use studyrag::ingestion::Ingestor;
//! use studyrag::retriever::Retriever;
//! use studyrag::store::SqliteVectorStore;
//! use studyrag::types::{NewDocument, SourceType};
//!
//! let config = RagConfig::from_env();
//! let embedder = Arc::new(EmbeddingService::from_config(&config));
//! let store = Arc::new(SqliteVectorStore::open("studyrag.db").await?);
//!
//! let ingestor = Ingestor::new(&config, embedder.clone(), store.clone());
//! let doc = NewDocument::new("doc-1", SourceType::Youtube, "dQw4w9WgXcQ", "Lecture 1");
//! let chunk_count = ingestor.ingest(doc, &transcript).await?;
//!
//! let retriever = Retriever::new(embedder, store);
//! let context = retriever
//!     .retrieve_context("doc-1", "what is photosynthesis?", config.max_retrieval_chunks)
//!     .await?;
//! ```

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod ingestion;
pub mod retriever;
pub mod store;
pub mod types;

pub use chunking::{chunk_text, clean_text};
pub use config::{EMBEDDING_DIMENSIONS, RagConfig};
pub use embeddings::{EmbeddingProvider, EmbeddingService};
pub use ingestion::Ingestor;
pub use retriever::Retriever;
pub use store::{ChunkRecord, SearchHit, SearchResults, SqliteVectorStore, VectorStore};
pub use types::{Document, NewDocument, RagError, SourceType};
