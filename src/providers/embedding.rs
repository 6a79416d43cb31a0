//! OpenAI-compatible embedding client (works with OpenAI, Azure, and
//! proxies exposing `/v1/embeddings`).

use std::time::Duration;

use async_trait::async_trait;

use super::{with_retries, EmbeddingProvider};
use crate::error::{Result, ShortstackError};

const EMBED_ATTEMPTS: u32 = 3;
const EMBED_BACKOFF: Duration = Duration::from_millis(200);

/// REST embedding provider with a fixed declared dimension.
///
/// Transport and HTTP-level failures are retried up to 3 attempts with
/// exponential backoff; a response vector of the wrong length is fatal
/// for the call and surfaces immediately as `EmbeddingDimension`.
#[derive(Debug)]
pub struct RestEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    dimensions: usize,
}

impl RestEmbeddingProvider {
    /// # Errors
    ///
    /// Returns [`ShortstackError::InvalidConfig`] when `dimensions` is
    /// zero or the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(ShortstackError::InvalidConfig(
                "embedding dimensions must be greater than 0".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ShortstackError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            dimensions,
        })
    }

    async fn request_embeddings(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "input": texts,
            "model": model,
            "encoding_format": "float",
            "dimensions": self.dimensions,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ShortstackError::EmbeddingProvider(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(ShortstackError::EmbeddingProvider(format!(
                "embedding API error ({status}): {body_text}"
            )));
        }

        let response: serde_json::Value = resp.json().await.map_err(|e| {
            ShortstackError::EmbeddingProvider(format!("failed to parse response: {e}"))
        })?;

        let data = response
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                ShortstackError::EmbeddingProvider("response missing `data` array".into())
            })?;

        if data.len() != texts.len() {
            return Err(ShortstackError::EmbeddingProvider(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }

        // Order by the `index` field; providers may return out of order.
        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for item in data {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .unwrap_or(indexed.len() as u64) as usize;
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| {
                    ShortstackError::EmbeddingProvider("response item missing `embedding`".into())
                })?;
            let vec: Vec<f32> = embedding
                .iter()
                .map(|v| {
                    v.as_f64().map(|f| f as f32).ok_or_else(|| {
                        ShortstackError::EmbeddingProvider(
                            "embedding contains non-numeric value".into(),
                        )
                    })
                })
                .collect::<Result<_>>()?;

            if vec.len() != self.dimensions {
                return Err(ShortstackError::EmbeddingDimension {
                    expected: self.dimensions,
                    got: vec.len(),
                });
            }
            indexed.push((index, vec));
        }
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for RestEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retries(EMBED_ATTEMPTS, EMBED_BACKOFF, || {
            self.request_embeddings(model, texts)
        })
        .await
    }
}
