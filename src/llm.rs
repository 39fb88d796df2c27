//! Outbound text generation.
//!
//! The scorer only needs "system + user in, text out"; any OpenAI-compatible
//! chat-completions endpoint satisfies [`ChatCompletionsClient`].

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::error;

use crate::error::ScoreError;

pub const DEFAULT_BASE_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw completion text. Only transport and quota failures
    /// are errors; odd content is the caller's problem.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ScoreError>;

    fn model_name(&self) -> &str;
}

pub struct ChatCompletionsClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Bounds each upstream request. Without it requests may wait indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ScoreError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }
}

/// Maps a non-success status to the matching upstream failure.
pub fn classify_status(status: StatusCode) -> ScoreError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ScoreError::UpstreamRateLimited,
        StatusCode::PAYMENT_REQUIRED => ScoreError::UpstreamBillingRequired,
        other => ScoreError::UpstreamUnavailable(format!("AI gateway returned {}", other)),
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ScoreError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let err = classify_status(status);
            if let ScoreError::UpstreamUnavailable(_) = err {
                let text = response.text().await.unwrap_or_default();
                error!("AI gateway error: {} {}", status, text);
            }
            return Err(err);
        }

        let resp_json: serde_json::Value = response.json().await.map_err(|e| {
            ScoreError::UpstreamUnavailable(format!("Failed to parse response JSON: {}", e))
        })?;

        Ok(resp_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
