//! Turning raw model text into a validated [`AnalysisResult`].

use super::schema::AnalysisResult;
use crate::llm::error::AnalysisError;

/// Strip a markdown code fence around the payload, if present.
///
/// Models often answer with ```` ```json ... ``` ```` even when told not
/// to. The content of the first fenced block wins. Text that already
/// starts with a JSON object, or has no fence, is returned trimmed, so a
/// fence inside a string value is left alone.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after_open = &trimmed[open + 3..];
    // Skip the info string (`json`, `JSON`, ...) if any.
    let info_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let body = &after_open[info_len..];

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parse and validate model output against the contract.
///
/// Caller must have already rejected empty output with
/// [`AnalysisError::ProviderEmptyResponse`].
///
/// # Errors
///
/// - [`AnalysisError::InvalidOutputJson`] when the text is not JSON
/// - [`AnalysisError::SchemaViolation`] when the JSON does not match
pub fn parse_analysis_output(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let payload = strip_code_fences(text);

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| AnalysisError::invalid_json(e.to_string(), payload))?;

    if !value.is_object() {
        return Err(AnalysisError::SchemaViolation(
            "top-level value must be an object with an `operations` array".to_owned(),
        ));
    }

    let result: AnalysisResult = serde_json::from_value(value)
        .map_err(|e| AnalysisError::SchemaViolation(e.to_string()))?;
    result.validate()?;
    Ok(result)
}
