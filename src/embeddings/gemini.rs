//! Secondary remote embedding tier: the Gemini embeddings API.
//!
//! Gemini supports an explicit output dimensionality per request, which we pin
//! so the vector width never drifts with model defaults. The native width of
//! `text-embedding-004` is below the pipeline's fixed dimensionality, so
//! vectors from this tier are zero-padded and re-normalized by the service.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EMBEDDING_DIMENSIONS, GeminiConfig, MAX_EMBED_BATCH};

use super::{EmbeddingProvider, ProviderError, ProviderErrorKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Native output width of `text-embedding-004`.
const DEFAULT_OUTPUT_DIMENSIONS: usize = 768;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

pub struct GeminiEmbeddings {
    config: GeminiConfig,
    client: Client,
    output_dimensions: usize,
}

impl GeminiEmbeddings {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        Self {
            config,
            client,
            output_dimensions: DEFAULT_OUTPUT_DIMENSIONS.min(EMBEDDING_DIMENSIONS),
        }
    }

    /// Overrides the requested output width, for models with a different
    /// native dimensionality. Values above the pipeline width are clamped.
    #[must_use]
    pub fn with_output_dimensions(mut self, dimensions: usize) -> Self {
        self.output_dimensions = dimensions.min(EMBEDDING_DIMENSIONS);
        self
    }

    async fn embed_sub_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_key,
        );
        let request = BatchEmbedRequest {
            requests: batch
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.config.model),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    output_dimensionality: self.output_dimensions,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest("gemini", err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("gemini", status.as_u16(), body));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::new("gemini", ProviderErrorKind::InvalidResponse, err.to_string()))?;

        if parsed.embeddings.len() != batch.len() {
            return Err(ProviderError::new(
                "gemini",
                ProviderErrorKind::InvalidResponse,
                format!(
                    "{} embeddings for {} inputs",
                    parsed.embeddings.len(),
                    batch.len()
                ),
            ));
        }

        Ok(parsed
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn native_dimensions(&self) -> usize {
        self.output_dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let vectors = self.embed_sub_batch(batch).await?;
            all.extend(vectors);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn provider(server: &MockServer) -> GeminiEmbeddings {
        GeminiEmbeddings::new(GeminiConfig::new("g-test").with_base_url(server.base_url()))
    }

    #[tokio::test]
    async fn embeds_with_explicit_output_dimensionality() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/models/text-embedding-004:batchEmbedContents")
                .query_param("key", "g-test")
                .body_contains("\"outputDimensionality\":768");
            then.status(200).json_body(serde_json::json!({
                "embeddings": [
                    { "values": [0.5, 0.5] },
                    { "values": [0.1, 0.9] }
                ]
            }));
        });

        let vectors = provider(&server)
            .embed_batch(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.1, 0.9]);
    }

    #[tokio::test]
    async fn forbidden_is_classified_as_auth() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/models/text-embedding-004:batchEmbedContents");
            then.status(403).body("API key not valid");
        });

        let err = provider(&server)
            .embed_batch(&["text".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }

    #[tokio::test]
    async fn count_mismatch_is_invalid_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/models/text-embedding-004:batchEmbedContents");
            then.status(200)
                .json_body(serde_json::json!({ "embeddings": [] }));
        });

        let err = provider(&server)
            .embed_batch(&["text".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidResponse);
    }
}
