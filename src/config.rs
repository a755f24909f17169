//! Pipeline configuration.
//!
//! Configuration is an explicit value constructed once at process start and
//! passed by reference into each component constructor. There is no cached
//! global; anything that needs a knob receives it.
//!
//! Credentials are boolean gates for tier selection. Their values are carried
//! to the HTTP clients and never logged.

use std::env;

/// Fixed dimensionality of every stored and queried embedding vector.
///
/// Vectors produced by a provider with a different native dimensionality are
/// padded or truncated to this width and re-normalized before they leave the
/// embedding layer.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Maximum number of texts sent to a remote provider in one request.
pub const MAX_EMBED_BATCH: usize = 100;

/// Credentials and model selection for the primary remote embedding tier.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// Override for tests and self-hosted gateways.
    pub base_url: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Credentials and model selection for the secondary remote embedding tier.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "text-embedding-004".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Tunables for chunking, embedding fallback, and retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Maximum chunk length in characters.
    pub max_chunk_size: usize,
    /// Characters of trailing context carried into the next chunk.
    pub chunk_overlap: usize,
    /// Default number of chunks returned by retrieval.
    pub max_retrieval_chunks: usize,
    /// Allow the network-free local embedder as the last tier.
    pub embedding_fallback_to_local: bool,
    pub openai: Option<OpenAiConfig>,
    pub gemini: Option<GeminiConfig>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 512,
            chunk_overlap: 50,
            max_retrieval_chunks: 5,
            embedding_fallback_to_local: true,
            openai: None,
            gemini: None,
        }
    }
}

impl RagConfig {
    /// Loads configuration from the environment, reading a `.env` file first
    /// when one is present.
    ///
    /// Recognized variables: `OPENAI_API_KEY`, `OPENAI_EMBEDDING_MODEL`,
    /// `GEMINI_API_KEY`, `GEMINI_EMBEDDING_MODEL`, `MAX_CHUNK_SIZE`,
    /// `CHUNK_OVERLAP`, `MAX_RETRIEVAL_CHUNKS`, `EMBEDDING_FALLBACK_TO_LOCAL`.
    /// Missing or unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Some(key) = non_empty_var("OPENAI_API_KEY") {
            let mut openai = OpenAiConfig::new(key);
            if let Some(model) = non_empty_var("OPENAI_EMBEDDING_MODEL") {
                openai.model = model;
            }
            config.openai = Some(openai);
        }
        if let Some(key) = non_empty_var("GEMINI_API_KEY") {
            let mut gemini = GeminiConfig::new(key);
            if let Some(model) = non_empty_var("GEMINI_EMBEDDING_MODEL") {
                gemini.model = model;
            }
            config.gemini = Some(gemini);
        }

        if let Some(value) = parse_var::<usize>("MAX_CHUNK_SIZE") {
            config.max_chunk_size = value;
        }
        if let Some(value) = parse_var::<usize>("CHUNK_OVERLAP") {
            config.chunk_overlap = value;
        }
        if let Some(value) = parse_var::<usize>("MAX_RETRIEVAL_CHUNKS") {
            config.max_retrieval_chunks = value;
        }
        if let Some(value) = parse_var::<bool>("EMBEDDING_FALLBACK_TO_LOCAL") {
            config.embedding_fallback_to_local = value;
        }

        config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.max_chunk_size, 512);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.max_retrieval_chunks, 5);
        assert!(config.embedding_fallback_to_local);
        assert!(config.openai.is_none());
        assert!(config.gemini.is_none());
    }

    #[test]
    fn builders_override_base_urls() {
        let openai = OpenAiConfig::new("sk-test").with_base_url("http://localhost:9000/v1");
        assert_eq!(openai.base_url, "http://localhost:9000/v1");
        let gemini = GeminiConfig::new("g-test").with_base_url("http://localhost:9001");
        assert_eq!(gemini.base_url, "http://localhost:9001");
    }
}
