//! Multi-provider embedding generation with ordered fallback.
//!
//! Every configured backend sits behind the [`EmbeddingProvider`] trait and is
//! tried in priority order by the [`EmbeddingService`] until one embeds the
//! whole batch:
//!
//! ```text
//!   texts ──► OpenAI (if key) ──► Gemini (if key) ──► local hash (if enabled)
//!                  │ fail              │ fail               │ fail
//!                  └──────── advance ──┴──────── advance ───┴──► NoEmbeddingProvider
//! ```
//!
//! A tier either embeds the entire batch or is considered failed for that
//! batch; partial results never leave this module. Whatever tier produced the
//! vectors, they are padded/truncated to [`EMBEDDING_DIMENSIONS`] and
//! L2-normalized before being returned, so cosine similarity and dot product
//! rank identically downstream.

pub mod gemini;
pub mod local;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{EMBEDDING_DIMENSIONS, RagConfig};
use crate::types::RagError;

pub use gemini::GeminiEmbeddings;
pub use local::HashEmbeddings;
pub use openai::OpenAiEmbeddings;

/// Why a single tier failed. All kinds are recoverable by advancing to the
/// next tier; the distinction exists for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Invalid or missing credentials (HTTP 401/403).
    Auth,
    /// Quota exhausted or rate limited (HTTP 429).
    RateLimit,
    /// The request did not complete in time.
    Timeout,
    /// Any other transport or server failure.
    Http,
    /// The provider answered, but not with one vector per input.
    InvalidResponse,
}

/// Failure of one embedding tier for one batch.
#[derive(Debug, Error)]
#[error("{provider}: {kind:?}: {message}")]
pub struct ProviderError {
    pub provider: &'static str,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: &'static str, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Classifies an HTTP status into a provider error kind.
    pub(crate) fn from_status(provider: &'static str, status: u16, body: String) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            429 => ProviderErrorKind::RateLimit,
            _ => ProviderErrorKind::Http,
        };
        Self::new(provider, kind, format!("status {status}: {body}"))
    }

    pub(crate) fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Http
        };
        Self::new(provider, kind, err.to_string())
    }
}

/// One embedding backend in the fallback chain.
///
/// Implementations must preserve input order and embed the whole batch or
/// fail; they return vectors at their native dimensionality and leave
/// normalization to the service.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &'static str;

    /// Dimensionality of the raw vectors this backend produces.
    fn native_dimensions(&self) -> usize;

    /// Embeds every text in `texts`, one vector per input, order-preserving.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Pads or truncates `vector` to `dimensions`, then L2-normalizes it.
///
/// A zero vector is left as-is; the retriever tolerates it rather than
/// dividing by zero.
pub fn normalize_to_dimensions(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    vector.resize(dimensions, 0.0);
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// Ordered fallback chain over the configured embedding tiers.
pub struct EmbeddingService {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    dimensions: usize,
}

impl EmbeddingService {
    /// Builds the tier chain from configuration: OpenAI when a key is present,
    /// then Gemini when a key is present, then the local hashing embedder when
    /// the fallback flag allows it.
    pub fn from_config(config: &RagConfig) -> Self {
        let mut providers: Vec<Arc<dyn EmbeddingProvider>> = Vec::new();
        if let Some(openai) = &config.openai {
            providers.push(Arc::new(OpenAiEmbeddings::new(openai.clone())));
        }
        if let Some(gemini) = &config.gemini {
            providers.push(Arc::new(GeminiEmbeddings::new(gemini.clone())));
        }
        if config.embedding_fallback_to_local {
            providers.push(Arc::new(HashEmbeddings::new()));
        }
        Self::with_providers(providers)
    }

    /// Builds a service over an explicit tier list. Used by tests and by
    /// callers that bring their own backends.
    pub fn with_providers(providers: Vec<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            providers,
            dimensions: EMBEDDING_DIMENSIONS,
        }
    }

    /// Number of configured tiers.
    pub fn tier_count(&self) -> usize {
        self.providers.len()
    }

    /// Embeds `texts`, trying each tier in order until one succeeds for the
    /// whole batch. Returns one normalized `dimensions`-wide vector per input.
    ///
    /// Tier failures are logged and absorbed; only exhaustion of every tier
    /// surfaces, as [`RagError::NoEmbeddingProvider`].
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.providers.is_empty() {
            return Err(RagError::NoEmbeddingProvider(
                "no provider configured and local fallback is disabled".to_string(),
            ));
        }

        let mut failures: Vec<String> = Vec::new();
        for provider in &self.providers {
            match provider.embed_batch(texts).await {
                Ok(vectors) if vectors.len() == texts.len() => {
                    debug!(
                        provider = provider.name(),
                        native_dimensions = provider.native_dimensions(),
                        count = vectors.len(),
                        "embedded batch"
                    );
                    return Ok(vectors
                        .into_iter()
                        .map(|vector| normalize_to_dimensions(vector, self.dimensions))
                        .collect());
                }
                Ok(vectors) => {
                    // Count mismatch: treat the tier as failed, never return a
                    // partial batch.
                    warn!(
                        provider = provider.name(),
                        expected = texts.len(),
                        got = vectors.len(),
                        "provider returned wrong vector count, advancing to next tier"
                    );
                    failures.push(format!(
                        "{}: returned {} vectors for {} inputs",
                        provider.name(),
                        vectors.len(),
                        texts.len()
                    ));
                }
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        kind = ?err.kind,
                        error = %err.message,
                        "embedding tier unavailable, advancing to next tier"
                    );
                    failures.push(err.to_string());
                }
            }
        }

        Err(RagError::NoEmbeddingProvider(format!(
            "all {} tier(s) failed: {}",
            self.providers.len(),
            failures.join("; ")
        )))
    }
}

/// Deterministic in-memory provider for tests and examples.
///
/// Vectors are derived from a hash of the text, so identical inputs embed
/// identically across calls while distinct inputs diverge.
pub struct MockEmbeddingProvider {
    dimensions: usize,
    fail_with: Option<ProviderErrorKind>,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self {
            dimensions: 64,
            fail_with: None,
        }
    }

    /// A mock that always fails with `kind`, for exercising the fallback chain.
    pub fn failing(kind: ProviderErrorKind) -> Self {
        Self {
            dimensions: 64,
            fail_with: Some(kind),
        }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn native_dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if let Some(kind) = self.fail_with {
            return Err(ProviderError::new("mock", kind, "configured to fail"));
        }
        Ok(texts
            .iter()
            .map(|text| {
                use rustc_hash::FxHasher;
                use std::hash::{Hash, Hasher};

                let mut vector = vec![0.0f32; self.dimensions];
                for (position, token) in text.split_whitespace().enumerate() {
                    let mut hasher = FxHasher::default();
                    token.to_lowercase().hash(&mut hasher);
                    position.hash(&mut hasher);
                    let bucket = (hasher.finish() as usize) % self.dimensions;
                    vector[bucket] += 1.0;
                }
                if vector.iter().all(|v| *v == 0.0) {
                    vector[0] = 1.0;
                }
                vector
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(providers: Vec<Arc<dyn EmbeddingProvider>>) -> EmbeddingService {
        EmbeddingService::with_providers(providers)
    }

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn normalization_pads_and_unit_scales() {
        let vector = normalize_to_dimensions(vec![3.0, 4.0], 6);
        assert_eq!(vector.len(), 6);
        assert!((norm(&vector) - 1.0).abs() < 1e-6);
        assert_eq!(&vector[2..], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalization_truncates_wider_vectors() {
        let vector = normalize_to_dimensions(vec![1.0; 10], 4);
        assert_eq!(vector.len(), 4);
        assert!((norm(&vector) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_stays_zero() {
        let vector = normalize_to_dimensions(vec![0.0, 0.0], 4);
        assert!(vector.iter().all(|v| *v == 0.0));
        assert_eq!(vector.len(), 4);
    }

    #[tokio::test]
    async fn no_tiers_configured_is_a_hard_failure() {
        let svc = service(vec![]);
        let err = svc.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, RagError::NoEmbeddingProvider(_)));
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let svc = service(vec![]);
        assert!(svc.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn output_meets_dimension_and_norm_invariants() {
        let svc = service(vec![Arc::new(MockEmbeddingProvider::new())]);
        let vectors = svc
            .embed(&["first text".to_string(), "second text".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), EMBEDDING_DIMENSIONS);
            assert!((norm(vector) - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn auth_failure_advances_to_next_tier() {
        let svc = service(vec![
            Arc::new(MockEmbeddingProvider::failing(ProviderErrorKind::Auth)),
            Arc::new(MockEmbeddingProvider::new()),
        ]);
        let vectors = svc.embed(&["query".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), EMBEDDING_DIMENSIONS);
        // Fallback output is indistinguishable in shape and normalization.
        assert!((norm(&vectors[0]) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn exhausted_tiers_surface_no_provider() {
        let svc = service(vec![
            Arc::new(MockEmbeddingProvider::failing(ProviderErrorKind::RateLimit)),
            Arc::new(MockEmbeddingProvider::failing(ProviderErrorKind::Timeout)),
        ]);
        let err = svc.embed(&["query".to_string()]).await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, RagError::NoEmbeddingProvider(_)));
        assert!(message.contains("2 tier(s)"));
    }

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec![
            "hello world".to_string(),
            "goodbye world".to_string(),
            "hello world".to_string(),
        ];
        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
    }
}
