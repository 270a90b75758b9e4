//! Concrete provider adapters and the HTTP plumbing they share.

pub mod anthropic;
pub mod openai;
pub mod sse;

pub use anthropic::{AnthropicAdapter, AnthropicConfig};
pub use openai::{OpenAiAdapter, OpenAiConfig};

use std::collections::VecDeque;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use self::sse::{SseEvent, SseLineParser};
use super::error::AnalysisError;
use super::provider::{ChatChunk, ChatStream};
use super::usage::TokenUsage;
use crate::observability::redact_api_key;

/// Whole-request timeout for provider calls. Stays well inside the zone
/// job's expiry window so a hung call fails the attempt instead of
/// outliving its claim.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// HTTP client with a whole-request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Map an HTTP error response to a typed error.
///
/// 401/403 are auth failures, 429 is a rate limit, 5xx and Anthropic's 529
/// overload status are provider errors, everything else is a request error.
pub fn map_http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> AnalysisError {
    let detail = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => AnalysisError::Auth(format!("{provider}: {detail}")),
        429 => AnalysisError::Request(format!("{provider} rate limit exceeded: {detail}")),
        529 => AnalysisError::Provider(format!("{provider} overloaded: {detail}")),
        s if s >= 500 => AnalysisError::Provider(format!("{provider} HTTP {s}: {detail}")),
        _ => AnalysisError::Request(format!("{provider} HTTP {status}: {detail}")),
    }
}

/// Pull `error.message` out of a JSON error body, falling back to a bounded
/// prefix of the raw body. Keys echoed back by the provider are redacted.
fn extract_error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_owned()
            } else {
                body.chars().take(500).collect()
            }
        });
    redact_api_key(&message)
}

/// Read an error response and map it, logging the status.
pub(crate) async fn error_from_response(
    provider: &str,
    response: reqwest::Response,
) -> AnalysisError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read body".into());
    let err = map_http_error(provider, status, &body);
    tracing::error!(status = %status, error = %err, "{provider} request returned error");
    err
}

/// Per-provider decoding of one SSE event: returns a text delta, if any, and
/// folds token counts into `usage`.
pub(crate) type SseDecoder = fn(&SseEvent, &mut TokenUsage) -> Result<Option<String>, AnalysisError>;

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    parser: SseLineParser,
    usage: TokenUsage,
    queue: VecDeque<Result<ChatChunk, AnalysisError>>,
    finished: bool,
}

impl StreamState {
    fn feed(&mut self, event: &SseEvent, decode: SseDecoder) {
        if self.finished {
            return;
        }
        match decode(event, &mut self.usage) {
            Ok(Some(text)) if !text.is_empty() => self.queue.push_back(Ok(ChatChunk::Delta(text))),
            Ok(_) => {}
            Err(e) => {
                self.queue.push_back(Err(e));
                self.finished = true;
            }
        }
    }
}

/// Turn a streaming response body into text deltas followed by a final
/// [`ChatChunk::Done`] carrying the accumulated usage.
pub(crate) fn sse_chat_stream(response: reqwest::Response, decode: SseDecoder) -> ChatStream {
    let state = StreamState {
        bytes: response.bytes_stream().boxed(),
        parser: SseLineParser::new(),
        usage: TokenUsage::default(),
        queue: VecDeque::new(),
        finished: false,
    };

    let stream = futures_util::stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in state.parser.push(&chunk) {
                        state.feed(&event, decode);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(AnalysisError::Stream(format!("stream read error: {e}"))),
                        state,
                    ));
                }
                None => {
                    if let Some(event) = state.parser.finish() {
                        state.feed(&event, decode);
                    }
                    if !state.finished {
                        state.finished = true;
                        state.queue.push_back(Ok(ChatChunk::Done(state.usage)));
                    }
                }
            }
        }
    });
    Box::pin(stream)
}
