//! Typed definitions for the analysis output contract.
//!
//! The same types drive validation of model output and the JSON Schema
//! embedded in the prompt, so the two cannot drift apart.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::error::AnalysisError;

/// Maximum characters in a task label.
pub const LABEL_MAX_CHARS: usize = 60;

/// Maximum characters in a task context note.
pub const CONTEXT_MAX_CHARS: usize = 200;

/// Maximum characters in an update/complete/cancel reason.
///
/// Reasons may overwrite a task's context, so they share its cap.
pub const REASON_MAX_CHARS: usize = CONTEXT_MAX_CHARS;

macro_rules! contract_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse the wire representation.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

contract_enum! {
    /// Kind of care action a task recommends.
    ActionType {
        /// Watering.
        Water => "water",
        /// Feeding / soil amendment.
        Fertilize => "fertilize",
        /// Picking ripe produce.
        Harvest => "harvest",
        /// Pruning, pinching, deadheading.
        Prune => "prune",
        /// Sowing or transplanting.
        Plant => "plant",
        /// Watch for a developing condition.
        Monitor => "monitor",
        /// Shelter from frost, heat, pests.
        Protect => "protect",
        /// Anything else.
        Other => "other",
    }
}

contract_enum! {
    /// How soon a task should be acted on.
    Priority {
        /// Act immediately.
        Urgent => "urgent",
        /// Act today.
        Today => "today",
        /// Act in the coming days.
        Upcoming => "upcoming",
        /// No action required.
        Informational => "informational",
    }
}

contract_enum! {
    /// What a task is about.
    TargetType {
        /// The whole zone.
        Zone => "zone",
        /// A single plant in the zone.
        Plant => "plant",
    }
}

/// Payload of a `create` operation: a brand new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTask {
    /// Whether the task targets the zone or one of its plants.
    pub target_type: TargetType,
    /// Zone id or plant id, matching `target_type`.
    pub target_id: String,
    /// Kind of care action.
    pub action_type: ActionType,
    /// Urgency.
    pub priority: Priority,
    /// Short imperative label.
    #[schemars(length(min = 1, max = 60))]
    pub label: String,
    /// Date the action should happen (`YYYY-MM-DD`).
    pub suggested_date: NaiveDate,
    /// Why the task matters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 200))]
    pub context: Option<String>,
    /// Freeform recurrence, e.g. `"every 3 days"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    /// Ask the gardener for a photo when completing the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_photo: Option<bool>,
}

/// Payload of an `update` operation: only present fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    /// Id of an existing pending task in the zone.
    pub task_id: String,
    /// New action type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 1, max = 60))]
    pub label: Option<String>,
    /// New suggested date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_date: Option<NaiveDate>,
    /// New context note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 200))]
    pub context: Option<String>,
    /// New recurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    /// New photo-request flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_photo: Option<bool>,
    /// Why the task changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 200))]
    pub reason: Option<String>,
}

impl TaskUpdate {
    /// True when no task field would change.
    pub fn is_empty(&self) -> bool {
        self.action_type.is_none()
            && self.priority.is_none()
            && self.label.is_none()
            && self.suggested_date.is_none()
            && self.context.is_none()
            && self.recurrence.is_none()
            && self.request_photo.is_none()
    }
}

/// Payload of `complete` and `cancel` operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskClosure {
    /// Id of an existing pending task in the zone.
    pub task_id: String,
    /// Why the task is closed. Replaces the task's context when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 200))]
    pub reason: Option<String>,
}

/// One proposed mutation of the zone's task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new pending task.
    Create(CreateTask),
    /// Change fields of a pending task.
    Update(TaskUpdate),
    /// Mark a pending task as done.
    Complete(TaskClosure),
    /// Withdraw a pending task.
    Cancel(TaskClosure),
}

impl Operation {
    /// Wire name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Complete(_) => "complete",
            Self::Cancel(_) => "cancel",
        }
    }

    /// Referenced task id, if the operation targets an existing task.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Create(_) => None,
            Self::Update(u) => Some(&u.task_id),
            Self::Complete(c) | Self::Cancel(c) => Some(&c.task_id),
        }
    }
}

/// Validated output of one zone analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Ordered task operations.
    pub operations: Vec<Operation>,
    /// Free-text observations about the zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    /// Short alerts worth surfacing prominently.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<String>,
}

impl AnalysisResult {
    /// Check the rules serde cannot express: length caps and non-empty ids.
    ///
    /// Over-long text is rejected, never truncated.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (index, op) in self.operations.iter().enumerate() {
            let at = |field: &str| format!("operations[{index}].{field}");
            match op {
                Operation::Create(c) => {
                    require_non_empty(&at("targetId"), &c.target_id)?;
                    require_non_empty(&at("label"), &c.label)?;
                    cap(&at("label"), &c.label, LABEL_MAX_CHARS)?;
                    if let Some(context) = &c.context {
                        cap(&at("context"), context, CONTEXT_MAX_CHARS)?;
                    }
                }
                Operation::Update(u) => {
                    require_non_empty(&at("taskId"), &u.task_id)?;
                    if let Some(label) = &u.label {
                        require_non_empty(&at("label"), label)?;
                        cap(&at("label"), label, LABEL_MAX_CHARS)?;
                    }
                    if let Some(context) = &u.context {
                        cap(&at("context"), context, CONTEXT_MAX_CHARS)?;
                    }
                    if let Some(reason) = &u.reason {
                        cap(&at("reason"), reason, REASON_MAX_CHARS)?;
                    }
                }
                Operation::Complete(c) | Operation::Cancel(c) => {
                    require_non_empty(&at("taskId"), &c.task_id)?;
                    if let Some(reason) = &c.reason {
                        cap(&at("reason"), reason, REASON_MAX_CHARS)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AnalysisError> {
    if value.trim().is_empty() {
        return Err(AnalysisError::SchemaViolation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn cap(field: &str, value: &str, max: usize) -> Result<(), AnalysisError> {
    let len = value.chars().count();
    if len > max {
        return Err(AnalysisError::SchemaViolation(format!(
            "{field} exceeds {max} characters (got {len})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_json() -> serde_json::Value {
        json!({
            "op": "create",
            "targetType": "plant",
            "targetId": "plant-1",
            "actionType": "water",
            "priority": "today",
            "label": "Water the tomatoes",
            "suggestedDate": "2025-06-01"
        })
    }

    #[test]
    fn create_operation_deserializes() {
        let op: Operation = serde_json::from_value(create_json()).expect("parse create");
        match op {
            Operation::Create(c) => {
                assert_eq!(c.target_type, TargetType::Plant);
                assert_eq!(c.action_type, ActionType::Water);
                assert_eq!(c.priority, Priority::Today);
                assert_eq!(c.suggested_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
                assert!(c.context.is_none());
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let mut value = create_json();
        value["actionType"] = json!("dance");
        assert!(serde_json::from_value::<Operation>(value).is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let value = json!({"op": "delete", "taskId": "t1"});
        assert!(serde_json::from_value::<Operation>(value).is_err());
    }

    #[test]
    fn complete_with_reason_deserializes() {
        let op: Operation =
            serde_json::from_value(json!({"op": "complete", "taskId": "T1", "reason": "done"}))
                .expect("parse complete");
        assert_eq!(op.kind(), "complete");
        assert_eq!(op.task_id(), Some("T1"));
    }

    #[test]
    fn label_at_cap_is_accepted() {
        let mut value = create_json();
        value["label"] = json!("a".repeat(LABEL_MAX_CHARS));
        let result = AnalysisResult {
            operations: vec![serde_json::from_value(value).expect("parse")],
            observations: None,
            alerts: Vec::new(),
        };
        assert!(result.validate().is_ok());
    }

    #[test]
    fn label_over_cap_is_a_schema_violation() {
        let mut value = create_json();
        value["label"] = json!("a".repeat(LABEL_MAX_CHARS + 1));
        let result = AnalysisResult {
            operations: vec![serde_json::from_value(value).expect("parse")],
            observations: None,
            alerts: Vec::new(),
        };
        let err = result.validate().expect_err("label over cap");
        assert_eq!(err.code(), "SCHEMA_VIOLATION");
        assert!(err.to_string().contains("operations[0].label"));
    }

    #[test]
    fn context_over_cap_is_a_schema_violation() {
        let mut value = create_json();
        value["context"] = json!("c".repeat(CONTEXT_MAX_CHARS + 1));
        let result = AnalysisResult {
            operations: vec![serde_json::from_value(value).expect("parse")],
            observations: None,
            alerts: Vec::new(),
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn caps_count_characters_not_bytes() {
        let mut value = create_json();
        value["label"] = json!("🍅".repeat(LABEL_MAX_CHARS));
        let result = AnalysisResult {
            operations: vec![serde_json::from_value(value).expect("parse")],
            observations: None,
            alerts: Vec::new(),
        };
        assert!(result.validate().is_ok());
    }

    #[test]
    fn empty_task_id_is_rejected() {
        let result = AnalysisResult {
            operations: vec![Operation::Cancel(TaskClosure {
                task_id: "  ".into(),
                reason: None,
            })],
            observations: None,
            alerts: Vec::new(),
        };
        assert!(result.validate().is_err());
    }

    #[test]
    fn update_is_empty_ignores_reason() {
        let update = TaskUpdate {
            task_id: "t".into(),
            reason: Some("nothing changed".into()),
            ..TaskUpdate::default()
        };
        assert!(update.is_empty());
    }

    #[test]
    fn enum_parse_round_trips_wire_names() {
        for action in ActionType::ALL {
            assert_eq!(ActionType::parse(action.as_str()), Some(*action));
        }
        assert_eq!(Priority::parse("later"), None);
        assert_eq!(TargetType::parse("zone"), Some(TargetType::Zone));
    }
}
