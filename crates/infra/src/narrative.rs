//! HTTP narrative client for a Gemini-style `generateContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use opspilot_agents::{NarrativeError, NarrativeService};

#[derive(Debug, Clone)]
pub struct NarrativeClientConfig {
    /// Full `generateContent` URL, e.g.
    /// `https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent`.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_output_tokens: u32,
}

impl NarrativeClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(20),
            max_output_tokens: 512,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpNarrativeClient {
    client: reqwest::Client,
    config: NarrativeClientConfig,
}

impl HttpNarrativeClient {
    pub fn new(config: NarrativeClientConfig) -> Result<Self, NarrativeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NarrativeError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }
}

fn request_body(prompt: &str, context: &JsonValue, max_output_tokens: u32) -> JsonValue {
    let text = format!(
        "You are an analyst for a retail supply chain operations platform.\n\n\
         Context: {context}\n\n\
         Query: {prompt}\n\n\
         Provide a concise, actionable response focused on vendor management, logistics or compliance."
    );
    json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "maxOutputTokens": max_output_tokens,
            "temperature": 0.4
        }
    })
}

fn extract_text(response: &JsonValue) -> Result<String, NarrativeError> {
    response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(JsonValue::as_str)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| NarrativeError::InvalidResponse("no content in response".to_string()))
}

#[async_trait]
impl NarrativeService for HttpNarrativeClient {
    async fn generate(&self, prompt: &str, context: &JsonValue) -> Result<String, NarrativeError> {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .json(&request_body(prompt, context, self.config.max_output_tokens));
        if let Some(key) = &self.config.api_key {
            req = req.header("x-goog-api-key", key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                NarrativeError::Timeout
            } else {
                NarrativeError::Unavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NarrativeError::Unavailable(format!("status {}: {body}", status.as_u16())));
        }

        let body: JsonValue = resp
            .json()
            .await
            .map_err(|e| NarrativeError::InvalidResponse(e.to_string()))?;
        let text = extract_text(&body)?;
        debug!(chars = text.len(), "narrative generated");
        Ok(text)
    }
}
