//! Structured tracing span names and field keys.
//!
//! Spans follow the hierarchy:
//!
//! ```text
//! plotwise.job.execute
//!   ├─> plotwise.provider.request
//!   └─> plotwise.reconcile.batch
//! ```

/// Span for one queue job execution (trigger, garden, or zone).
pub const SPAN_JOB_EXECUTE: &str = "plotwise.job.execute";

/// Span for an upstream AI provider request.
pub const SPAN_PROVIDER_REQUEST: &str = "plotwise.provider.request";

/// Span for applying one operation batch to the task table.
pub const SPAN_RECONCILE_BATCH: &str = "plotwise.reconcile.batch";

/// Provider name field (e.g. "anthropic", "openai").
pub const FIELD_PROVIDER: &str = "provider";

/// Model identifier field.
pub const FIELD_MODEL: &str = "model";

/// Endpoint type field (e.g. "messages", "chat_completions").
pub const FIELD_ENDPOINT_TYPE: &str = "endpoint_type";

/// Queue job name field.
pub const FIELD_JOB_NAME: &str = "job_name";

/// Queue job id field.
pub const FIELD_JOB_ID: &str = "job_id";

/// Garden id field.
pub const FIELD_GARDEN_ID: &str = "garden_id";

/// Zone id field.
pub const FIELD_ZONE_ID: &str = "zone_id";

/// Audit record id field.
pub const FIELD_ANALYSIS_ID: &str = "analysis_id";
