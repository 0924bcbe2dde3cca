//! Summarization provider abstraction.
//!
//! [`ChatProvider`] is the single seam between the pipeline and the
//! external language-model service: submit a role-tagged prompt, get the
//! assistant's text back. [`OpenAiProvider`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint; tests substitute scripted fakes.
//!
//! # Error mapping
//!
//! - Network failure or timeout → [`DigestError::ProviderTransport`] without a status
//! - Non-2xx status → [`DigestError::ProviderTransport`] with the status and a body excerpt
//! - 2xx without `choices[0].message.content` → [`DigestError::ProviderResponse`]
//!
//! Requests are never retried automatically.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ProviderConfig;
use crate::error::{DigestError, DigestResult};

/// Longest body excerpt kept in transport errors.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature. Low values keep the output close to deterministic.
    pub temperature: f32,
    /// Ask the provider to answer with a single JSON object.
    pub json_object: bool,
}

/// The external summarization service.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Submit `request` and return the assistant message text.
    async fn complete(&self, request: &ChatRequest) -> DigestResult<String>;
}

/// Provider for OpenAI-compatible chat completion APIs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiProvider {
    /// Build a provider from configuration.
    ///
    /// # Errors
    ///
    /// [`DigestError::CredentialMissing`] when neither `provider.api_key`
    /// nor `OPENAI_API_KEY` is set.
    pub fn new(config: &ProviderConfig) -> DigestResult<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DigestError::ProviderTransport {
                status: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: completions_url(&config.endpoint),
            model: config.model.clone(),
            api_key,
        })
    }
}

fn completions_url(endpoint: &str) -> String {
    format!("{}/chat/completions", endpoint.trim_end_matches('/'))
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> DigestResult<String> {
        let body = build_request_body(&self.model, request);
        let started = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DigestError::ProviderTransport {
                status: None,
                message: if e.is_timeout() {
                    format!("request to {} timed out", self.url)
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(DigestError::ProviderTransport {
                status: Some(status.as_u16()),
                message: truncate(&body_text, MAX_ERROR_BODY_CHARS),
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| DigestError::ProviderResponse {
                    stage: "completion",
                    message: format!("response body is not JSON: {}", e),
                })?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider call finished"
        );

        parse_completion(&json)
    }
}

/// The JSON body for a `/chat/completions` call.
pub(crate) fn build_request_body(model: &str, request: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": request.messages,
        "temperature": request.temperature,
    });
    if request.json_object {
        body["response_format"] = serde_json::json!({ "type": "json_object" });
    }
    body
}

/// Extract `choices[0].message.content`.
pub(crate) fn parse_completion(json: &serde_json::Value) -> DigestResult<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| DigestError::ProviderResponse {
            stage: "completion",
            message: "missing choices[0].message.content".to_string(),
        })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
