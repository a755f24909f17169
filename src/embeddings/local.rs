//! Network-free local embedding tier.
//!
//! A feature-hashing bag-of-words embedder: tokens (and adjacent token pairs)
//! are hashed into a fixed number of buckets and counted. It is far weaker
//! than a learned model but fully deterministic, dependency-free at runtime,
//! and good enough to rank chunks of one document when every remote tier is
//! unavailable. Only enabled when the configuration opts in.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rustc_hash::FxHasher;

use super::{EmbeddingProvider, ProviderError};

/// Native width of the local embedder, mirroring small sentence-embedding
/// models; the service pads to the pipeline width.
const LOCAL_DIMENSIONS: usize = 384;

pub struct HashEmbeddings {
    dimensions: usize,
}

impl HashEmbeddings {
    pub fn new() -> Self {
        Self {
            dimensions: LOCAL_DIMENSIONS,
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = FxHasher::default();
        feature.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(|token| token.to_lowercase())
            .collect();

        for token in &tokens {
            vector[self.bucket(token)] += 1.0;
        }
        // Bigrams give the vector a little word-order sensitivity.
        for pair in tokens.windows(2) {
            let feature = format!("{} {}", pair[0], pair[1]);
            vector[self.bucket(&feature)] += 0.5;
        }
        vector
    }
}

impl Default for HashEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddings {
    fn name(&self) -> &'static str {
        "local-hash"
    }

    fn native_dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}
