//! Durable at-least-once job queue.
//!
//! Jobs move `created → active → completed`, or on failure to `retry`
//! (re-fetchable after the retry delay) until the retry limit is spent and
//! then to `failed`. An active job not settled within its expiry window is
//! treated as failed, so a crashed worker's job is picked up again.
//!
//! Every fetch hands out a fresh claim token. Settling a job requires the
//! token of its current claim, so a worker that lost its claim to an expiry
//! sweep cannot settle the attempt another worker is running.

pub mod sqlite;
pub mod worker;

pub use sqlite::SqliteJobQueue;
pub use worker::{BatchReport, JobHandler, WorkerOptions, on_batch, process_batch};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default expiry window: 15 minutes.
pub const DEFAULT_EXPIRE_IN_SECS: u64 = 15 * 60;

/// Errors from the job queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("blocking queue task failed: {0}")]
    Task(String),

    #[error("queue is closed")]
    Closed,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Retry,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Retry => "retry",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "retry" => Some(Self::Retry),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Queued or running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Created | Self::Retry | Self::Active)
    }
}

/// Per-job delivery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Extra attempts after the first failure.
    pub retry_limit: u32,
    /// Fixed delay before a failed job becomes fetchable again.
    pub retry_delay_secs: u64,
    /// Seconds an active job may run before it is considered abandoned.
    pub expire_in_secs: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            retry_limit: 0,
            retry_delay_secs: 0,
            expire_in_secs: DEFAULT_EXPIRE_IN_SECS,
        }
    }
}

impl JobOptions {
    /// No retries, default expiry.
    pub fn no_retry() -> Self {
        Self::default()
    }
}

/// A job handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub data: serde_json::Value,
    /// Attempts already failed.
    pub retry_count: u32,
    pub retry_limit: u32,
    /// Token of the fetch that handed this job out.
    pub claim: String,
}

impl Job {
    /// Deserialize the payload.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Full persisted view of a job, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub state: JobState,
    pub data: serde_json::Value,
    pub retry_count: u32,
    pub retry_limit: u32,
    pub last_error: Option<String>,
    pub start_after: DateTime<Utc>,
}

/// Queue operations used by the pipeline.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a new job; returns its id.
    async fn enqueue(
        &self,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<String, QueueError>;

    /// Claim up to `batch_size` due jobs of `name`, marking them active.
    /// Expired active jobs are swept first.
    async fn fetch(&self, name: &str, batch_size: usize) -> Result<Vec<Job>, QueueError>;

    /// Restart the expiry clock of a claimed job as its handler begins.
    /// Returns `false` when the claim is no longer current.
    async fn start(&self, job: &Job) -> Result<bool, QueueError>;

    /// Mark a claimed job completed. Returns `false` if the claim is no
    /// longer current.
    async fn complete(&self, job: &Job) -> Result<bool, QueueError>;

    /// Record a failure of a claimed job. A `retryable` failure moves it to
    /// `Retry` while attempts remain; otherwise it goes straight to
    /// `Failed`. Returns `None` if the claim is no longer current.
    async fn fail(
        &self,
        job: &Job,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, QueueError>;

    /// In-flight jobs of `name` whose payload has `value` at JSON path
    /// `data_path` (e.g. `$.gardenId`).
    async fn count_in_flight(
        &self,
        name: &str,
        data_path: &str,
        value: &str,
    ) -> Result<u64, QueueError>;

    async fn job(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError>;

    /// Record `slot` as the latest run of `schedule` and enqueue a job in
    /// the same transaction. Returns `None` when that slot was already
    /// claimed, by this or another process. If the insert fails the slot
    /// stays unclaimed.
    async fn enqueue_for_slot(
        &self,
        schedule: &str,
        slot: &str,
        name: &str,
        data: serde_json::Value,
        options: JobOptions,
    ) -> Result<Option<String>, QueueError>;
}

/// Serialize `payload` and enqueue it.
pub async fn send<T: Serialize + Sync>(
    queue: &dyn JobQueue,
    name: &str,
    payload: &T,
    options: JobOptions,
) -> Result<String, QueueError> {
    let data = serde_json::to_value(payload)?;
    queue.enqueue(name, data, options).await
}
