//! Provider adapter trait and the primary/fallback provider pair.
//!
//! Both concrete adapters satisfy [`ProviderAdapter`] with identical
//! signatures and error taxonomy. Which one runs is decided by an explicit
//! [`ProviderRole`], never by inspecting the adapter.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::error::AnalysisError;
use super::usage::TokenUsage;
use crate::context::AnalysisContext;
use crate::contract::AnalysisResult;
use crate::observability::redact::RedactedString;

/// The slot a provider occupies in the selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    /// Preferred provider.
    Primary,
    /// Used only when the user has no primary credential.
    Fallback,
}

impl ProviderRole {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }

    /// Parse the storage form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decrypted provider API key.
///
/// Never printed: `Debug` shows a redacted form.
#[derive(Clone)]
pub struct Credential(RedactedString);

impl Credential {
    /// Wrap a plaintext API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self(RedactedString::new(api_key))
    }

    /// The plaintext key, for building request headers only.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({:?})", self.0)
    }
}

/// An image attached to a request, referenced by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Fetchable (typically presigned) URL.
    pub url: String,
    /// Short human description shown next to the image.
    pub description: Option<String>,
}

/// A single-turn conversational request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Optional system instructions.
    pub system: Option<String>,
    /// The user's message.
    pub message: String,
    /// Optional image attachment.
    pub image: Option<ImageRef>,
    /// Override for the adapter's max output tokens.
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a text-only request.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the system instructions.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Attach an image.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }
}

/// A completed chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Full reply text.
    pub text: String,
    /// Token counts.
    pub usage: TokenUsage,
}

/// One item of a streaming chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    /// Incremental text.
    Delta(String),
    /// Final token counts; always the last item of a successful stream.
    Done(TokenUsage),
}

/// A boxed stream of chat chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, AnalysisError>> + Send>>;

/// Uniform call contract for AI providers.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name (e.g. `"anthropic"`, `"openai"`).
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Run a zone analysis and validate the output against the contract.
    async fn analyze(
        &self,
        context: &AnalysisContext,
        credential: &Credential,
    ) -> Result<(AnalysisResult, TokenUsage), AnalysisError>;

    /// Single-turn chat.
    async fn chat(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ChatReply, AnalysisError>;

    /// Single-turn chat streamed as text deltas followed by token counts.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        credential: &Credential,
    ) -> Result<ChatStream, AnalysisError>;
}

/// The two configured providers, addressed by role.
#[derive(Clone)]
pub struct Providers {
    primary: Arc<dyn ProviderAdapter>,
    fallback: Arc<dyn ProviderAdapter>,
}

impl Providers {
    /// Pair a primary and a fallback adapter.
    pub fn new(primary: Arc<dyn ProviderAdapter>, fallback: Arc<dyn ProviderAdapter>) -> Self {
        Self { primary, fallback }
    }

    /// The adapter occupying `role`.
    pub fn get(&self, role: ProviderRole) -> &Arc<dyn ProviderAdapter> {
        match role {
            ProviderRole::Primary => &self.primary,
            ProviderRole::Fallback => &self.fallback,
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}
