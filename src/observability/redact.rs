//! Secret redaction for logs and error messages.
//!
//! Provider API keys and the unwrap-service token pass through this
//! crate; none of them may reach a log line.

use std::fmt;

/// A string wrapper that redacts its value in Display and Debug output.
///
/// The only way to read the inner value is [`expose`](RedactedString::expose).
#[derive(Clone, PartialEq, Eq)]
pub struct RedactedString {
    inner: String,
}

impl RedactedString {
    /// Create a new redacted string.
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Access the inner value, e.g. for an HTTP header.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// True when the wrapped value is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Display for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedString(\"[REDACTED]\")")
    }
}

/// Redact `sk-...` style API keys embedded in free text.
///
/// Upstream error bodies sometimes echo the key back; run them through
/// this before logging.
pub fn redact_api_key(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find("sk-") {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 3..];
        let key_len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        result.push_str("sk-***REDACTED***");
        rest = &after[key_len..];
    }
    result.push_str(rest);
    result
}
