//! OpenAI-compatible chat-completion client used for answer generation.

use std::time::Duration;

use async_trait::async_trait;

use super::{with_retries, GenerationProvider};
use crate::error::{Result, ShortstackError};

// Timeout + one retry, per the generation contract.
const GENERATE_ATTEMPTS: u32 = 2;
const GENERATE_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str = "You answer questions using only the provided context. \
If the context does not contain the answer, say you don't know.";

/// REST generation provider with a per-request timeout.
#[derive(Debug)]
pub struct RestGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl RestGenerationProvider {
    /// # Errors
    ///
    /// Returns [`ShortstackError::InvalidConfig`] if the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ShortstackError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        })
    }

    async fn request_completion(
        &self,
        model: &str,
        question: &str,
        context: &str,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Context:\n{context}\n\nQuestion: {question}") }
            ]
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ShortstackError::GenerationProvider(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(ShortstackError::GenerationProvider(format!(
                "generation API error ({status}): {body_text}"
            )));
        }

        let response: serde_json::Value = resp.json().await.map_err(|e| {
            ShortstackError::GenerationProvider(format!("failed to parse response: {e}"))
        })?;

        let answer = response
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ShortstackError::GenerationProvider("response missing message content".into())
            })?;

        Ok(answer.trim().to_owned())
    }
}

#[async_trait]
impl GenerationProvider for RestGenerationProvider {
    async fn generate(&self, model: &str, question: &str, context: &str) -> Result<String> {
        // The deadline covers the whole exchange, body read included; a
        // server that returns headers and then stalls still trips it.
        with_retries(GENERATE_ATTEMPTS, GENERATE_BACKOFF, || async {
            tokio::time::timeout(
                self.timeout,
                self.request_completion(model, question, context),
            )
            .await
            .map_err(|_| {
                ShortstackError::GenerationProvider(format!(
                    "request timed out after {:?}",
                    self.timeout
                ))
            })?
        })
        .await
    }
}
