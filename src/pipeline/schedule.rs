//! Daily trigger schedule.
//!
//! A background loop checks once a minute whether today's run time (UTC)
//! has passed and, if so, claims the day's slot in the queue database and
//! enqueues the trigger job in one transaction. The claim is shared by every
//! process on the same database, so the trigger fires at most once per day
//! even across restarts, and a failed enqueue leaves the slot for the next
//! tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::jobs::{TRIGGER_JOB, TriggerJob};
use crate::queue::{JobOptions, JobQueue, QueueError};

/// Interval between schedule checks (seconds).
const TICK_INTERVAL_SECS: u64 = 60;

/// Time of day, in UTC, at which the daily trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailySchedule {
    pub hour: u32,
    pub minute: u32,
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self { hour: 5, minute: 0 }
    }
}

impl DailySchedule {
    /// The slot (`YYYY-MM-DD`) that is due at `now`, or `None` before
    /// today's run time. An out-of-range time never fires.
    pub fn due_slot(&self, now: DateTime<Utc>) -> Option<String> {
        let at = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let scheduled = now.date_naive().and_time(at).and_utc();
        (now >= scheduled).then(|| now.date_naive().to_string())
    }
}

/// Enqueue the trigger if a slot is due and not yet claimed. Returns the
/// trigger job id when one was enqueued.
pub async fn fire_if_due(
    queue: &dyn JobQueue,
    schedule: &DailySchedule,
    options: JobOptions,
    now: DateTime<Utc>,
) -> Result<Option<String>, QueueError> {
    let Some(slot) = schedule.due_slot(now) else {
        return Ok(None);
    };
    let payload = serde_json::to_value(TriggerJob {
        slot: Some(slot.clone()),
    })?;
    let id = queue
        .enqueue_for_slot(TRIGGER_JOB, &slot, TRIGGER_JOB, payload, options)
        .await?;
    if let Some(id) = &id {
        info!(slot = %slot, job_id = %id, "daily analysis triggered");
    }
    Ok(id)
}

/// Spawn the schedule loop. It stops when `cancel` fires.
pub fn spawn_daily_trigger(
    queue: Arc<dyn JobQueue>,
    schedule: DailySchedule,
    options: JobOptions,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(hour = schedule.hour, minute = schedule.minute, "daily schedule started");
        let mut interval = tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("daily schedule cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match fire_if_due(queue.as_ref(), &schedule, options, Utc::now()).await {
                        Ok(_) => {}
                        Err(QueueError::Closed) => break,
                        Err(e) => error!(error = %e, "schedule check failed"),
                    }
                }
            }
        }
    })
}
