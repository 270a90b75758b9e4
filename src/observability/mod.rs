//! Observability helpers: span naming and secret redaction.
//!
//! Logging itself goes through `tracing`; the worker binary installs the
//! subscriber.

pub mod redact;
pub mod spans;

pub use redact::{RedactedString, redact_api_key};
pub use spans::{
    FIELD_ANALYSIS_ID, FIELD_ENDPOINT_TYPE, FIELD_GARDEN_ID, FIELD_JOB_ID, FIELD_JOB_NAME,
    FIELD_MODEL, FIELD_PROVIDER, FIELD_ZONE_ID, SPAN_JOB_EXECUTE, SPAN_PROVIDER_REQUEST,
    SPAN_RECONCILE_BATCH,
};
