//! OpenAI Chat Completions adapter (fallback provider).
//!
//! Analysis requests set `response_format = json_object`. Streaming
//! requests ask for a trailing usage chunk via `stream_options`.

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

const PROVIDER: &str = "openai";

/// Default model for zone analysis.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for the OpenAI adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    /// Base URL (defaults to `https://api.openai.com`).
    pub base_url: String,
    pub model: String,
    /// Optional `OpenAI-Organization` header.
    pub org_id: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            model: model.into(),
            org_id: None,
            max_tokens: 4096,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
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

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

/// Whether the body should constrain output to a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Build a Chat Completions body with an optional system message and one
/// user message of text plus image parts.
pub fn build_completions_request(
    model: &str,
    max_tokens: u32,
    system: Option<&str>,
    text: &str,
    images: &[ImageRef],
    format: ResponseFormat,
    stream: bool,
) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(json!({"role": "system", "content": system}));
    }

    let user_content = if images.is_empty() {
        Value::String(text.to_owned())
    } else {
        let mut parts = vec![json!({"type": "text", "text": text})];
        for (i, image) in images.iter().enumerate() {
            if let Some(description) = &image.description {
                parts.push(json!({"type": "text", "text": format!("Photo {}: {description}", i + 1)}));
            }
            parts.push(json!({"type": "image_url", "image_url": {"url": image.url}}));
        }
        Value::Array(parts)
    };
    messages.push(json!({"role": "user", "content": user_content}));

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": messages,
    });
    if format == ResponseFormat::JsonObject {
        body["response_format"] = json!({"type": "json_object"});
    }
    if stream {
        body["stream"] = Value::Bool(true);
        body["stream_options"] = json!({"include_usage": true});
    }
    body
}

/// Text of the first choice; `null` content counts as empty.
pub fn extract_text(response: &Value) -> String {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn decode_chunk(event: &SseEvent, usage: &mut TokenUsage) -> Result<Option<String>, AnalysisError> {
    if event.is_done() {
        return Ok(None);
    }
    let data: Value = serde_json::from_str(&event.data)
        .map_err(|e| AnalysisError::Stream(format!("invalid chunk: {e}")))?;

    if let Some(message) = data.pointer("/error/message").and_then(Value::as_str) {
        return Err(AnalysisError::Stream(message.to_owned()));
    }
    if let Some(reported) = data.get("usage").filter(|u| !u.is_null()) {
        *usage = TokenUsage::from_json(Some(reported), "prompt_tokens", "completion_tokens");
    }
    Ok(data
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_owned))
}

/// OpenAI Chat Completions adapter.
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            config,
        }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn post(
        &self,
        body: &Value,
        credential: &Credential,
    ) -> Result<reqwest::Response, AnalysisError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let mut request = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .json(body);
        if let Some(org) = &self.config.org_id {
            request = request.header("OpenAI-Organization", org);
        }
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "OpenAI request failed");
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
        let response = self.post(body, credential).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Request(format!("unreadable response body: {e}")))?;
        let usage = TokenUsage::from_json(value.get("usage"), "prompt_tokens", "completion_tokens");
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

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> Value {
        build_completions_request(
            &self.config.model,
            request.max_tokens.unwrap_or(self.config.max_tokens),
            request.system.as_deref(),
            &request.message,
            request.image.as_slice(),
            ResponseFormat::Text,
            stream,
        )
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
            let body = build_completions_request(
                &self.config.model,
                self.config.max_tokens,
                Some(&prompt.system),
                &prompt.user_text,
                &prompt.images,
                ResponseFormat::JsonObject,
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
                "OpenAI analysis parsed"
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
            let (text, usage) = self.complete(&self.chat_body(request, false), credential).await?;
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
            let response = self.post(&self.chat_body(request, true), credential).await?;
            tracing::debug!("OpenAI stream starting");
            Ok(sse_chat_stream(response, decode_chunk))
        }
        .instrument(self.span("chat_stream"))
        .await
    }
}
