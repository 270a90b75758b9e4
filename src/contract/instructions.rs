//! Prompt instruction block generated from the contract types.

use chrono::{Days, NaiveDate};

use super::schema::{
    ActionType, AnalysisResult, CONTEXT_MAX_CHARS, CreateTask, LABEL_MAX_CHARS, Operation,
    Priority, REASON_MAX_CHARS, TargetType, TaskClosure, TaskUpdate,
};

/// Placeholder ids used in the worked example. Never valid in a real zone.
pub const EXAMPLE_PLANT_ID: &str = "<plant-id>";
/// Placeholder pending-task id used in the worked example.
pub const EXAMPLE_TASK_ID: &str = "<pending-task-id>";

/// JSON Schema for [`AnalysisResult`], derived from the validated types.
pub fn output_json_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(AnalysisResult);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
}

/// A worked example that satisfies the contract.
///
/// Built from typed values so it always validates; `today` keeps the
/// example dates plausible.
pub fn example_result(today: NaiveDate) -> AnalysisResult {
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    AnalysisResult {
        operations: vec![
            Operation::Create(CreateTask {
                target_type: TargetType::Plant,
                target_id: EXAMPLE_PLANT_ID.to_owned(),
                action_type: ActionType::Water,
                priority: Priority::Today,
                label: "Deep-water the tomatoes".to_owned(),
                suggested_date: today,
                context: Some("Three dry days above 28°C; soil sensor reads 18%.".to_owned()),
                recurrence: Some("every 3 days".to_owned()),
                request_photo: None,
            }),
            Operation::Update(TaskUpdate {
                task_id: EXAMPLE_TASK_ID.to_owned(),
                priority: Some(Priority::Urgent),
                suggested_date: Some(tomorrow),
                reason: Some("Frost forecast moved forward.".to_owned()),
                ..TaskUpdate::default()
            }),
            Operation::Complete(TaskClosure {
                task_id: EXAMPLE_TASK_ID.to_owned(),
                reason: Some("Care log shows this was done yesterday.".to_owned()),
            }),
        ],
        observations: Some("Leaves look healthy; fruit set has started.".to_owned()),
        alerts: vec!["Frost expected tomorrow night".to_owned()],
    }
}

fn list<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the output instructions appended to every analysis prompt.
pub fn instruction_block(today: NaiveDate) -> String {
    let schema = serde_json::to_string_pretty(&output_json_schema()).unwrap_or_default();
    let example = serde_json::to_string_pretty(&example_result(today)).unwrap_or_default();

    format!(
        "## Output format\n\
         Respond with a single JSON object and nothing else. It must validate against \
         this JSON Schema:\n\
         {schema}\n\n\
         Rules:\n\
         - \"op\" is one of \"create\", \"update\", \"complete\", \"cancel\".\n\
         - actionType is one of {actions}.\n\
         - priority is one of {priorities}.\n\
         - targetType is one of {targets}; targetId must be the id of that zone or plant.\n\
         - label: at most {LABEL_MAX_CHARS} characters. context: at most \
         {CONTEXT_MAX_CHARS} characters. reason: at most {REASON_MAX_CHARS} characters. \
         Longer text is rejected.\n\
         - Dates use YYYY-MM-DD.\n\
         - update, complete and cancel may only reference taskIds listed under \
         \"Pending tasks\". Never invent task ids.\n\
         - Do not create a task that duplicates a pending one; update it instead.\n\
         - An empty operations array is a valid answer.\n\n\
         Example (ids are placeholders):\n\
         {example}\n",
        actions = list(ActionType::ALL),
        priorities = list(Priority::ALL),
        targets = list(TargetType::ALL),
    )
}
