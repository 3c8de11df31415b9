// =============================================================================
// LLM transport — model-agnostic JSON completion seam
// =============================================================================
//
// The agents only need one capability: "complete this prompt into a JSON
// object within a deadline". Schema validation and model-fallback policy
// live in the agents; transport-level retries are the transport's concern.
// =============================================================================

pub mod advisor;
pub mod consultant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// JSON-mode completion against a named model.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value>;
}

/// OpenAI-compatible chat-completions transport.
pub struct HttpLlmTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpLlmTransport {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmTransport for HttpLlmTransport {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2,
        });

        let request = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let resp = tokio::time::timeout(timeout, request)
            .await
            .context("completion deadline exceeded")?
            .context("completion request failed")?;

        let status = resp.status();
        let payload: serde_json::Value = resp
            .json()
            .await
            .context("completion response unparseable")?;
        if !status.is_success() {
            anyhow::bail!("completion endpoint returned {}: {}", status, payload);
        }

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .context("completion missing choices[0].message.content")?;

        let parsed: serde_json::Value =
            serde_json::from_str(content).context("model output is not valid JSON")?;
        debug!(model, "completion parsed");
        Ok(parsed)
    }
}

impl std::fmt::Debug for HttpLlmTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLlmTransport")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
