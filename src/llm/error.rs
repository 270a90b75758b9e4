//! Error types for provider adapters and the structured output contract.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`AnalysisError::code()`].
//! Codes are logged with every failed zone job and will not change.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Request to the provider failed (connection, 4xx, rate limit).
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming response encountered an error.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Provider-side failure (5xx, overloaded).
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";

    /// Provider returned no textual content.
    pub const PROVIDER_EMPTY_RESPONSE: &str = "PROVIDER_EMPTY_RESPONSE";

    /// Extracted text is not valid JSON.
    pub const INVALID_OUTPUT_JSON: &str = "INVALID_OUTPUT_JSON";

    /// Parsed JSON does not satisfy the output contract.
    pub const SCHEMA_VIOLATION: &str = "SCHEMA_VIOLATION";
}

/// Maximum number of characters of offending output kept in
/// [`AnalysisError::InvalidOutputJson`].
pub const OUTPUT_SNIPPET_CHARS: usize = 200;

/// Errors produced by provider adapters and output validation.
///
/// None of these are retried by the adapter itself. The per-zone job
/// propagates them so the job queue applies its retry policy.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Authentication failed (invalid/missing API key).
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    Auth(String),

    /// Request to the provider failed.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    Request(String),

    /// Streaming response encountered an error.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    Stream(String),

    /// Provider-specific error (server side).
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    Provider(String),

    /// The provider answered without any text payload.
    #[error("[{}] provider {} returned no text content", error_codes::PROVIDER_EMPTY_RESPONSE, .0)]
    ProviderEmptyResponse(String),

    /// The extracted text did not parse as JSON.
    #[error("[{}] {message}; output starts with: {snippet:?}", error_codes::INVALID_OUTPUT_JSON)]
    InvalidOutputJson {
        /// Parser message.
        message: String,
        /// Bounded prefix of the offending text.
        snippet: String,
    },

    /// The JSON parsed but violates the output contract.
    #[error("[{}] {}", error_codes::SCHEMA_VIOLATION, .0)]
    SchemaViolation(String),
}

impl AnalysisError {
    /// Build an [`AnalysisError::InvalidOutputJson`] keeping at most
    /// [`OUTPUT_SNIPPET_CHARS`] characters of the offending text.
    pub fn invalid_json(message: impl Into<String>, text: &str) -> Self {
        Self::InvalidOutputJson {
            message: message.into(),
            snippet: text.chars().take(OUTPUT_SNIPPET_CHARS).collect(),
        }
    }

    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => error_codes::AUTH_FAILED,
            Self::Request(_) => error_codes::REQUEST_FAILED,
            Self::Stream(_) => error_codes::STREAM_FAILED,
            Self::Provider(_) => error_codes::PROVIDER_ERROR,
            Self::ProviderEmptyResponse(_) => error_codes::PROVIDER_EMPTY_RESPONSE,
            Self::InvalidOutputJson { .. } => error_codes::INVALID_OUTPUT_JSON,
            Self::SchemaViolation(_) => error_codes::SCHEMA_VIOLATION,
        }
    }

    /// Returns true if another attempt could plausibly succeed.
    ///
    /// Auth failures need a credential change. Everything else, including
    /// malformed model output, may succeed on a fresh attempt since model
    /// output is non-deterministic.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth(_))
    }

    /// Returns true for errors raised while interpreting model output
    /// (as opposed to transport errors).
    pub fn is_output_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderEmptyResponse(_) | Self::InvalidOutputJson { .. } | Self::SchemaViolation(_)
        )
    }
}
