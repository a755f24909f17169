//! Primary remote embedding tier: the OpenAI embeddings API.
//!
//! Requests are issued in sub-batches of at most [`MAX_EMBED_BATCH`] texts,
//! sequentially, with the merged result preserving input order. The target
//! dimensionality is requested directly so vectors usually need no padding.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EMBEDDING_DIMENSIONS, MAX_EMBED_BATCH, OpenAiConfig};

use super::{EmbeddingProvider, ProviderError, ProviderErrorKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddings {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client with static configuration");
        Self { config, client }
    }

    async fn embed_sub_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = EmbeddingsRequest {
            model: &self.config.model,
            input: batch,
            dimensions: EMBEDDING_DIMENSIONS,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest("openai", err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("openai", status.as_u16(), body));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::new("openai", ProviderErrorKind::InvalidResponse, err.to_string()))?;

        if parsed.data.len() != batch.len() {
            return Err(ProviderError::new(
                "openai",
                ProviderErrorKind::InvalidResponse,
                format!("{} embeddings for {} inputs", parsed.data.len(), batch.len()),
            ));
        }

        // The API reports an index per item; order by it rather than trusting
        // response order.
        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn native_dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
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
