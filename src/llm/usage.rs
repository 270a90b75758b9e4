//! Token usage reported by providers.

use serde::{Deserialize, Serialize};

/// Token counts for a single provider request/response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt/input.
    pub input_tokens: u64,
    /// Number of tokens in the completion/output.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create a new token usage record.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens consumed.
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Accumulate token counts from another usage record.
    ///
    /// Streaming providers report input and output counts in separate
    /// events; this merges them.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    /// Read usage from a JSON `usage` object using the given field names.
    ///
    /// Missing fields count as zero.
    pub fn from_json(usage: Option<&serde_json::Value>, input_key: &str, output_key: &str) -> Self {
        let read = |key: &str| {
            usage
                .and_then(|u| u.get(key))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0)
        };
        Self::new(read(input_key), read(output_key))
    }
}
