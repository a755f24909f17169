//! Core data types and the error taxonomy shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a document's raw text originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Youtube,
    Pdf,
}

impl SourceType {
    /// Stable string form used in the persisted schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Youtube => "youtube",
            SourceType::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" => Ok(SourceType::Youtube),
            "pdf" => Ok(SourceType::Pdf),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

/// A fully ingested document. Created once per successful ingestion and
/// immutable thereafter; chunks reference it by id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    /// Full cleaned text the chunks were derived from.
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Identity and provenance for a document about to be ingested.
///
/// The ingestion orchestrator combines this with the raw text handed over by
/// the extraction layer to build the persisted [`Document`].
#[derive(Clone, Debug)]
pub struct NewDocument {
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
}

impl NewDocument {
    pub fn new(
        id: impl Into<String>,
        source_type: SourceType,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_type,
            source_id: source_id.into(),
            title: title.into(),
        }
    }

    /// Mints a fresh random document id; each ingestion of the same source
    /// produces a distinct document.
    pub fn with_generated_id(
        source_type: SourceType,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), source_type, source_id, title)
    }
}

/// Terminal errors surfaced by the pipeline.
///
/// Tier-level embedding provider failures are absorbed by the fallback chain
/// and never appear here individually; only exhaustion of every configured
/// tier surfaces as [`RagError::NoEmbeddingProvider`]. Likewise a failing
/// similarity query degrades to the unranked fallback first, and only a
/// failing fallback fetch surfaces as [`RagError::StoreQuery`].
#[derive(Debug, Error)]
pub enum RagError {
    /// Input produced no usable chunks (empty or whitespace-only after cleaning).
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Every configured embedding tier failed, or none was configured and the
    /// local fallback is disabled.
    #[error("no embedding provider available: {0}")]
    NoEmbeddingProvider(String),

    /// Persistence failure during upsert. The store guarantees no partial
    /// chunk rows are left behind.
    #[error("vector store write failed: {0}")]
    StoreWrite(String),

    /// Search failure that survived even the degraded fallback fetch.
    #[error("vector store query failed: {0}")]
    StoreQuery(String),

    /// A second ingestion was requested for a document that is still being
    /// ingested. Per-document ingestion is strictly sequential.
    #[error("ingestion already in progress for document '{0}'")]
    IngestionInProgress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_through_str() {
        for source in [SourceType::Youtube, SourceType::Pdf] {
            let parsed: SourceType = source.as_str().parse().unwrap();
            assert_eq!(parsed, source);
        }
        assert!("epub".parse::<SourceType>().is_err());
    }

    #[test]
    fn source_type_serializes_lowercase() {
        let json = serde_json::to_string(&SourceType::Youtube).unwrap();
        assert_eq!(json, "\"youtube\"");
    }
}
