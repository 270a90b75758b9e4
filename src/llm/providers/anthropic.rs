//! Anthropic Messages API adapter (primary provider).
//!
//! # Streaming event flow
//!
//! ```text
//! message_start → content_block_start → content_block_delta* → content_block_stop
//!              → message_delta → message_stop
//! ```
//!
//! `message_start` carries the input token count and `message_delta` the
//! output count; only `text_delta` deltas produce text.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::Instrument;

use super::sse::SseEvent;
use super::{DEFAULT_REQUEST_TIMEOUT_SECS, error_from_response, http_client, sse_chat_stream};
use crate::context::AnalysisContext;
use crate::contract::{AnalysisResult, parse_analysis_output};
use crate::llm::error::AnalysisError;
use crate::llm::prompt::analysis_prompt;
use crate::llm::provider::{
    ChatReply, ChatRequest, ChatStream, Credential, ImageRef, ProviderAdapter,
};
use crate::llm::usage::TokenUsage;
use crate::observability::spans::*;

const PROVIDER: &str = "anthropic";

/// Default model for zone analysis.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

// ── Configuration ──────────────────────────────────────────────

/// Configuration for the Anthropic adapter. The API key is supplied per
/// call, since every user brings their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicConfig {
    /// Base URL for the API (defaults to `https://api.anthropic.com`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// `anthropic-version` header value.
    pub api_version: String,
    /// Default max output tokens.
    pub max_tokens: u32,
    /// Whole-request timeout, including streamed bodies.
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_owned(),
            model: model.into(),
            api_version: "2023-06-01".to_owned(),
            max_tokens: 4096,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Set the base URL (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

// ── Request building ───────────────────────────────────────────

fn image_blocks(images: &[ImageRef]) -> Vec<Value> {
    let mut blocks = Vec::with_capacity(images.len() * 2);
    for (i, image) in images.iter().enumerate() {
        if let Some(description) = &image.description {
            blocks.push(json!({"type": "text", "text": format!("Photo {}: {description}", i + 1)}));
        }
        blocks.push(json!({
            "type": "image",
            "source": {"type": "url", "url": image.url},
        }));
    }
    blocks
}

/// Build a Messages API body with one user turn of text plus images.
pub fn build_messages_request(
    model: &str,
    max_tokens: u32,
    system: Option<&str>,
    text: &str,
    images: &[ImageRef],
    stream: bool,
) -> Value {
    let mut content = vec![json!({"type": "text", "text": text})];
    content.extend(image_blocks(images));

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [{"role": "user", "content": content}],
    });
    if let Some(system) = system {
        body["system"] = Value::String(system.to_owned());
    }
    if stream {
        body["stream"] = Value::Bool(true);
    }
    body
}

/// Join every `text` content block of a non-streaming response.
pub fn extract_text(response: &Value) -> String {
    response
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Decode one streaming event.
fn decode_event(event: &SseEvent, usage: &mut TokenUsage) -> Result<Option<String>, AnalysisError> {
    let event_type = event.event_type.as_deref().unwrap_or("");
    if event_type == "ping" || event_type == "message_stop" {
        return Ok(None);
    }
    let data: Value = serde_json::from_str(&event.data)
        .map_err(|e| AnalysisError::Stream(format!("invalid {event_type} event: {e}")))?;

    match event_type {
        "message_start" => {
            usage.add(&TokenUsage::from_json(
                data.pointer("/message/usage"),
                "input_tokens",
                "output_tokens",
            ));
            Ok(None)
        }
        "content_block_delta" => {
            let delta = data.get("delta");
            if delta.and_then(|d| d.get("type")).and_then(Value::as_str) == Some("text_delta") {
                Ok(delta
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_owned))
            } else {
                Ok(None)
            }
        }
        "message_delta" => {
            // Output count is cumulative, not incremental.
            let reported = TokenUsage::from_json(data.get("usage"), "input_tokens", "output_tokens");
            usage.output_tokens = usage.output_tokens.max(reported.output_tokens);
            Ok(None)
        }
        "error" => {
            let message = data
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error");
            Err(AnalysisError::Stream(message.to_owned()))
        }
        _ => Ok(None),
    }
}

// ── Adapter ────────────────────────────────────────────────────

/// Anthropic Messages API adapter.
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            config,
        }
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    async fn post(
        &self,
        body: &Value,
        credential: &Credential,
        stream: bool,
    ) -> Result<reqwest::Response, AnalysisError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", credential.expose())
            .header("anthropic-version", &self.config.api_version)
            .json(body);
        if stream {
            request = request.header("accept", "text/event-stream");
        }
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Anthropic request failed");
            AnalysisError::Request(format!("connection error: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }
        Ok(response)
    }

    async fn complete(
        &self,
        body: &Value,
        credential: &Credential,
    ) -> Result<(String, TokenUsage), AnalysisError> {
        let response = self.post(body, credential, false).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Request(format!("unreadable response body: {e}")))?;
        let usage = TokenUsage::from_json(value.get("usage"), "input_tokens", "output_tokens");
        Ok((extract_text(&value), usage))
    }

    fn span(&self, endpoint: &'static str) -> tracing::Span {
        tracing::info_span!(
            SPAN_PROVIDER_REQUEST,
            { FIELD_PROVIDER } = PROVIDER,
            { FIELD_MODEL } = %self.config.model,
            { FIELD_ENDPOINT_TYPE } = endpoint,
        )
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn analyze(
        &self,
        context: &AnalysisContext,
        credential: &Credential,
    ) -> Result<(AnalysisResult, TokenUsage), AnalysisError> {
        async {
            let prompt = analysis_prompt(context);
            let body = build_messages_request(
                &self.config.model,
                self.config.max_tokens,
                Some(&prompt.system),
                &prompt.user_text,
                &prompt.images,
                false,
            );
            let (text, usage) = self.complete(&body, credential).await?;
            if text.trim().is_empty() {
                return Err(AnalysisError::ProviderEmptyResponse(PROVIDER.to_owned()));
            }
            let result = parse_analysis_output(&text)?;
            tracing::info!(
                operations = result.operations.len(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Anthropic analysis parsed"
            );
            Ok((result, usage))
        }
        .instrument(self.span("analyze"))
        .await
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ChatReply, AnalysisError> {
        async {
            let body = build_messages_request(
                &self.config.model,
                request.max_tokens.unwrap_or(self.config.max_tokens),
                request.system.as_deref(),
                &request.message,
                request.image.as_slice(),
                false,
            );
            let (text, usage) = self.complete(&body, credential).await?;
            if text.trim().is_empty() {
                return Err(AnalysisError::ProviderEmptyResponse(PROVIDER.to_owned()));
            }
            Ok(ChatReply { text, usage })
        }
        .instrument(self.span("chat"))
        .await
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ChatStream, AnalysisError> {
        async {
            let body = build_messages_request(
                &self.config.model,
                request.max_tokens.unwrap_or(self.config.max_tokens),
                request.system.as_deref(),
                &request.message,
                request.image.as_slice(),
                true,
            );
            let response = self.post(&body, credential, true).await?;
            tracing::debug!("Anthropic stream starting");
            Ok(sse_chat_stream(response, decode_event))
        }
        .instrument(self.span("chat_stream"))
        .await
    }
}
