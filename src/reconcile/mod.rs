//! Applies AI-proposed task operations to a zone's task list.
//!
//! Operations run sequentially in array order and are isolated from each
//! other: one failing or stale operation is recorded and the batch goes on.
//! The pending-status guard lives in the store's conditional writes, so a
//! task the gardener closed meanwhile turns the operation into a skip.
//!
//! Replaying a batch after a job retry leaves update/complete/cancel
//! targets in the same end state; creates insert new tasks each time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument, debug, info, warn};

use crate::contract::{Operation, TaskClosure, TaskUpdate};
use crate::observability::spans::*;
use crate::store::{CompletedVia, GardenStore, TaskClose, TaskScope, TaskStatus};

/// Result of applying one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OperationStatus {
    /// The task was written.
    Applied,
    /// Nothing to do: the reference is stale, the task is closed, or the
    /// update carries no fields.
    Skipped(String),
    /// The store rejected the write.
    Failed(String),
}

/// Per-operation entry of a [`ReconcileReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    /// Position in the operation array.
    pub index: usize,
    /// `create`, `update`, `complete` or `cancel`.
    pub kind: &'static str,
    /// Task created or referenced, if any.
    pub task_id: Option<String>,
    pub status: OperationStatus,
}

/// Outcome list for a whole batch, in operation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub outcomes: Vec<OperationOutcome>,
}

impl ReconcileReport {
    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Applied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, OperationStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&OperationStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Apply `operations` to the tasks of `scope`, stamping every write with
/// `analysis_id`.
pub async fn reconcile(
    store: &dyn GardenStore,
    scope: &TaskScope,
    analysis_id: &str,
    operations: &[Operation],
    now: DateTime<Utc>,
) -> ReconcileReport {
    let span = tracing::info_span!(
        SPAN_RECONCILE_BATCH,
        { FIELD_GARDEN_ID } = %scope.garden_id,
        { FIELD_ZONE_ID } = %scope.zone_id,
        { FIELD_ANALYSIS_ID } = analysis_id,
        operations = operations.len(),
    );

    async {
        let mut report = ReconcileReport::default();
        for (index, op) in operations.iter().enumerate() {
            let outcome = apply_one(store, scope, analysis_id, index, op, now).await;
            match &outcome.status {
                OperationStatus::Applied => {
                    debug!(index, kind = outcome.kind, task_id = ?outcome.task_id, "operation applied")
                }
                OperationStatus::Skipped(reason) => {
                    info!(index, kind = outcome.kind, task_id = ?outcome.task_id, reason = %reason, "operation skipped")
                }
                OperationStatus::Failed(error) => {
                    warn!(index, kind = outcome.kind, task_id = ?outcome.task_id, error = %error, "operation failed")
                }
            }
            report.outcomes.push(outcome);
        }
        info!(
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            "reconciliation finished"
        );
        report
    }
    .instrument(span)
    .await
}

async fn apply_one(
    store: &dyn GardenStore,
    scope: &TaskScope,
    analysis_id: &str,
    index: usize,
    op: &Operation,
    now: DateTime<Utc>,
) -> OperationOutcome {
    let outcome = |task_id: Option<String>, status| OperationOutcome {
        index,
        kind: op.kind(),
        task_id,
        status,
    };

    match op {
        Operation::Create(create) => {
            match store.insert_task(scope, create, Some(analysis_id), now).await {
                Ok(task) => outcome(Some(task.id), OperationStatus::Applied),
                Err(e) => outcome(None, OperationStatus::Failed(e.to_string())),
            }
        }
        Operation::Update(update) => {
            let status = apply_update(store, scope, analysis_id, update, now).await;
            outcome(Some(update.task_id.clone()), status)
        }
        Operation::Complete(closure) => {
            let status =
                apply_close(store, scope, analysis_id, closure, TaskStatus::Completed, now).await;
            outcome(Some(closure.task_id.clone()), status)
        }
        Operation::Cancel(closure) => {
            let status =
                apply_close(store, scope, analysis_id, closure, TaskStatus::Cancelled, now).await;
            outcome(Some(closure.task_id.clone()), status)
        }
    }
}

async fn apply_update(
    store: &dyn GardenStore,
    scope: &TaskScope,
    analysis_id: &str,
    update: &TaskUpdate,
    now: DateTime<Utc>,
) -> OperationStatus {
    if update.is_empty() {
        return OperationStatus::Skipped("update carries no fields".to_owned());
    }
    match store
        .update_pending_task(&scope.zone_id, update, analysis_id, now)
        .await
    {
        Ok(true) => OperationStatus::Applied,
        Ok(false) => stale_reference(store, scope, &update.task_id).await,
        Err(e) => OperationStatus::Failed(e.to_string()),
    }
}

async fn apply_close(
    store: &dyn GardenStore,
    scope: &TaskScope,
    analysis_id: &str,
    closure: &TaskClosure,
    status: TaskStatus,
    now: DateTime<Utc>,
) -> OperationStatus {
    let close = TaskClose {
        status,
        via: CompletedVia::Ai,
        reason: closure.reason.clone(),
        at: now,
    };
    match store
        .close_pending_task(&scope.zone_id, &closure.task_id, &close, Some(analysis_id))
        .await
    {
        Ok(true) => OperationStatus::Applied,
        Ok(false) => stale_reference(store, scope, &closure.task_id).await,
        Err(e) => OperationStatus::Failed(e.to_string()),
    }
}

/// Explain why a guarded write matched nothing.
async fn stale_reference(store: &dyn GardenStore, scope: &TaskScope, task_id: &str) -> OperationStatus {
    let reason = match store.task(task_id).await {
        Ok(None) => "task does not exist".to_owned(),
        Ok(Some(task)) if task.zone_id != scope.zone_id => "task belongs to another zone".to_owned(),
        Ok(Some(task)) => format!("task is already {}", task.status.as_str()),
        Err(e) => return OperationStatus::Failed(format!("task lookup failed: {e}")),
    };
    OperationStatus::Skipped(reason)
}
