//! Structured output contract shared by both provider adapters.
//!
//! - [`schema`]: typed operations, enumerations and length caps
//! - [`extract`]: fence stripping, JSON parsing and validation
//! - [`instructions`]: the prompt block generated from the same types

pub mod extract;
pub mod instructions;
pub mod schema;

pub use extract::{parse_analysis_output, strip_code_fences};
pub use instructions::{example_result, instruction_block, output_json_schema};
pub use schema::{
    ActionType, AnalysisResult, CONTEXT_MAX_CHARS, CreateTask, LABEL_MAX_CHARS, Operation,
    Priority, REASON_MAX_CHARS, TargetType, TaskClosure, TaskUpdate,
};
