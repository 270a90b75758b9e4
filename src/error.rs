//! Error types for the plotwise pipeline.

use crate::context::ContextError;
use crate::credentials::CredentialError;
use crate::llm::AnalysisError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Top-level error type for pipeline jobs and the worker.
#[derive(Debug, thiserror::Error)]
pub enum PlotwiseError {
    /// Provider call or output validation failed.
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Domain store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Job queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Provider key could not be unwrapped.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Analysis context could not be assembled.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// No garden with this id.
    #[error("garden not found: {0}")]
    GardenNotFound(String),

    /// Job payload did not match its job kind.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlotwiseError {
    /// Whether another attempt of the same job could succeed.
    ///
    /// Rejected provider keys, malformed credential records and payloads
    /// that do not match their job kind fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Analysis(e) => e.is_retryable(),
            Self::Credential(CredentialError::Malformed(_)) => false,
            Self::Payload(_) | Self::GardenNotFound(_) | Self::Config(_) => false,
            _ => true,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PlotwiseError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn auth_and_payload_errors_are_permanent() {
        assert!(!PlotwiseError::from(AnalysisError::Auth("401".into())).is_retryable());
        let payload = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert!(!PlotwiseError::from(payload).is_retryable());
        assert!(
            !PlotwiseError::from(CredentialError::Malformed("iv".into())).is_retryable()
        );
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PlotwiseError::from(AnalysisError::Provider("overloaded".into())).is_retryable());
        assert!(PlotwiseError::from(CredentialError::Unwrap("503".into())).is_retryable());
        assert!(PlotwiseError::from(QueueError::Closed).is_retryable());
    }
}
