//! AI provider layer.
//!
//! - [`provider`]: the adapter trait, roles and request types
//! - [`providers`]: Anthropic (primary) and OpenAI (fallback) adapters
//! - [`prompt`]: context rendering shared by both adapters
//! - [`error`]: error taxonomy with stable codes
//! - [`usage`]: token accounting

pub mod error;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod usage;

pub use error::{AnalysisError, error_codes};
pub use provider::{
    ChatChunk, ChatReply, ChatRequest, ChatStream, Credential, ImageRef, ProviderAdapter,
    ProviderRole, Providers,
};
pub use providers::{AnthropicAdapter, AnthropicConfig, OpenAiAdapter, OpenAiConfig};
pub use usage::TokenUsage;
