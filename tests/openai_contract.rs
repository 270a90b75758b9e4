//! OpenAI Provider Contract Tests
//!
//! These tests verify HTTP format compliance of the OpenAI adapter.
//! Focus: request format, JSON-object response mode, response parsing and
//! error mapping. Streaming SSE chunks are covered at the end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use futures_util::StreamExt;
use plotwise::llm::provider::{ChatChunk, ChatRequest, ProviderAdapter};
use plotwise::llm::{AnalysisError, OpenAiAdapter, OpenAiConfig, TokenUsage};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> OpenAiAdapter {
    OpenAiAdapter::new(OpenAiConfig::new("gpt-test").with_base_url(server.uri()))
}

fn completion(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 210, "completion_tokens": 33, "total_tokens": 243}
    }))
}

#[tokio::test]
async fn test_analysis_request_uses_bearer_and_json_object_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-openai-user"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(completion(json!(common::one_create_output().to_string())))
        .expect(1)
        .mount(&server)
        .await;

    let (result, usage) = adapter(&server)
        .analyze(&common::zone_context(), &common::credential("sk-openai-user"))
        .await
        .unwrap();
    assert_eq!(result.operations.len(), 1);
    assert_eq!(usage, TokenUsage::new(210, 33));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    let parts = body["messages"][1]["content"].as_array().unwrap();
    assert!(parts.iter().any(|part| {
        part["type"] == "image_url"
            && part["image_url"]["url"] == "https://photos.example/z1/leaf.jpg"
    }));
}

#[tokio::test]
async fn test_organization_header_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("OpenAI-Organization", "org-garden"))
        .respond_with(completion(json!("Prune after flowering.")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        OpenAiConfig::new("gpt-test")
            .with_base_url(server.uri())
            .with_org_id("org-garden"),
    );
    let reply = adapter
        .chat(&ChatRequest::new("When to prune?"), &common::credential("k"))
        .await
        .unwrap();
    assert_eq!(reply.text, "Prune after flowering.");
}

#[tokio::test]
async fn test_fenced_output_is_accepted() {
    let server = MockServer::start().await;
    let fenced = format!("```json\n{}\n```", common::one_create_output());
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(json!(fenced)))
        .mount(&server)
        .await;

    let (result, _) = adapter(&server)
        .analyze(&common::zone_context(), &common::credential("k"))
        .await
        .unwrap();
    assert_eq!(result.alerts.len(), 1);
}

#[tokio::test]
async fn test_null_content_is_empty_response_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(serde_json::Value::Null))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .analyze(&common::zone_context(), &common::credential("k"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::ProviderEmptyResponse(_)), "got {err}");
    assert!(err.is_output_error());
}

#[tokio::test]
async fn test_unknown_operation_is_rejected() {
    let server = MockServer::start().await;
    let output = json!({"operations": [{"op": "delete", "taskId": "t1"}]});
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion(json!(output.to_string())))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .analyze(&common::zone_context(), &common::credential("k"))
        .await
        .unwrap_err();
    assert!(err.is_output_error(), "got {err}");
}

#[tokio::test]
async fn test_401_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .analyze(&common::zone_context(), &common::credential("k"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Auth(_)), "got {err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_429_maps_to_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests"}
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .analyze(&common::zone_context(), &common::credential("k"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Request(ref m) if m.contains("rate limit")), "got {err}");
}

#[tokio::test]
async fn test_chat_stream_reads_deltas_and_usage_chunk() {
    let server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Feed \"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"monthly.\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "stream": true,
            "stream_options": {"include_usage": true}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .mount(&server)
        .await;

    let stream = adapter(&server)
        .chat_stream(&ChatRequest::new("Feeding?"), &common::credential("k"))
        .await
        .unwrap();
    let chunks: Vec<ChatChunk> = stream.map(|c| c.unwrap()).collect().await;
    let text: String = chunks
        .iter()
        .filter_map(|c| match c {
            ChatChunk::Delta(d) => Some(d.as_str()),
            ChatChunk::Done(_) => None,
        })
        .collect();
    assert_eq!(text, "Feed monthly.");
    assert_eq!(chunks.last(), Some(&ChatChunk::Done(TokenUsage::new(9, 3))));
}
