//! Batch workers polling the job queue.
//!
//! Each fetched job is settled on its own: a handler `Ok` completes it, an
//! `Err` fails it so the queue applies the retry policy. Errors that cannot
//! succeed on another attempt fail the job outright. A failing job never
//! prevents the rest of the batch from completing.
//!
//! Jobs of a batch run one after another, so each job's expiry clock is
//! restarted right before its handler runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::{Job, JobQueue, JobState, QueueError};
use crate::observability::spans::*;

/// Something that processes jobs of one kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> crate::Result<()>;
}

/// Polling behaviour for one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Jobs claimed per fetch.
    pub batch_size: usize,
    /// Pause between fetches when the queue is idle.
    pub poll_interval_ms: u64,
    /// Independent worker loops for this job kind.
    pub concurrency: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_interval_ms: 2_000,
            concurrency: 1,
        }
    }
}

impl WorkerOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// What happened to one fetched batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    /// Failed jobs rescheduled for another attempt.
    pub retried: usize,
    /// Failed jobs with no attempts left.
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed + self.retried + self.failed
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
    }
}

/// Fetch one batch of `name` and run `handler` over it sequentially.
pub async fn process_batch(
    queue: &dyn JobQueue,
    name: &str,
    handler: &dyn JobHandler,
    batch_size: usize,
) -> Result<BatchReport, QueueError> {
    let jobs = queue.fetch(name, batch_size).await?;
    let mut report = BatchReport::default();

    for job in jobs {
        let span = tracing::info_span!(
            SPAN_JOB_EXECUTE,
            { FIELD_JOB_NAME } = %job.name,
            { FIELD_JOB_ID } = %job.id,
            attempt = job.retry_count + 1,
        );
        async {
            if !queue.start(&job).await? {
                warn!("job claim lost before its handler started; skipping");
                return Ok(());
            }
            match handler.handle(&job).await {
                Ok(()) => {
                    if queue.complete(&job).await? {
                        report.completed += 1;
                    } else {
                        warn!("job claim lost before completing; it likely expired");
                    }
                }
                Err(e) => match queue.fail(&job, &e.to_string(), e.is_retryable()).await? {
                    Some(JobState::Retry) => {
                        warn!(error = %e, "job failed; retry scheduled");
                        report.retried += 1;
                    }
                    Some(_) => {
                        error!(error = %e, "job failed permanently");
                        report.failed += 1;
                    }
                    None => warn!(error = %e, "job failed after its claim was lost"),
                },
            }
            Ok::<(), QueueError>(())
        }
        .instrument(span)
        .await?;
    }

    if report.total() > 0 {
        debug!(
            job_name = name,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            "batch settled"
        );
    }
    Ok(report)
}

/// Spawn `options.concurrency` loops processing `name` until `cancel` fires.
///
/// A loop polls again immediately after a non-empty batch and sleeps for
/// the poll interval otherwise.
pub fn on_batch(
    queue: Arc<dyn JobQueue>,
    name: &'static str,
    handler: Arc<dyn JobHandler>,
    options: WorkerOptions,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..options.concurrency.max(1))
        .map(|worker| {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                info!(job_name = name, worker, "job worker started");
                loop {
                    let idle = match process_batch(
                        queue.as_ref(),
                        name,
                        handler.as_ref(),
                        options.batch_size,
                    )
                    .await
                    {
                        Ok(report) => report.total() == 0,
                        Err(QueueError::Closed) => {
                            info!(job_name = name, worker, "queue closed; worker stopping");
                            break;
                        }
                        Err(e) => {
                            error!(job_name = name, worker, error = %e, "fetching jobs failed");
                            true
                        }
                    };
                    if !idle && !cancel.is_cancelled() {
                        continue;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(job_name = name, worker, "job worker cancelled");
                            break;
                        }
                        _ = tokio::time::sleep(options.poll_interval()) => {}
                    }
                }
            })
        })
        .collect()
}
