//! Domain store consumed by the pipeline.
//!
//! Reads are ownership-scoped (a zone is only returned together with its
//! garden id). Task writes carry the pending-status guard inside the
//! conditional update itself, so a task closed by the gardener is never
//! touched by a concurrent analysis.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteGardenStore;
pub use types::{
    AnalysisRecord, AnalysisScope, CachedWeather, CareLogEntry, CompletedVia, Garden, GeoPoint,
    NewAnalysisRecord, PhotoRecord, Plant, SensorReading, SkillLevel, Task, TaskClose, TaskScope,
    TaskStatus, Zone,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::contract::{CreateTask, TaskUpdate};
use crate::credentials::EncryptedCredential;
use crate::llm::provider::ProviderRole;
use crate::weather::WeatherSnapshot;

/// Errors from the domain store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    Lock(String),

    #[error("blocking store task failed: {0}")]
    Task(String),
}

/// Persistence operations the pipeline needs.
#[async_trait]
pub trait GardenStore: Send + Sync {
    /// Every garden, for the daily trigger.
    async fn list_gardens(&self) -> Result<Vec<Garden>, StoreError>;

    async fn garden(&self, garden_id: &str) -> Result<Option<Garden>, StoreError>;

    async fn zones_for_garden(&self, garden_id: &str) -> Result<Vec<Zone>, StoreError>;

    /// The zone, only if it belongs to `garden_id`.
    async fn zone(&self, garden_id: &str, zone_id: &str) -> Result<Option<Zone>, StoreError>;

    async fn plants_for_zone(&self, zone_id: &str) -> Result<Vec<Plant>, StoreError>;

    /// Care log entries performed at or after `since`, newest first.
    async fn recent_care_logs(
        &self,
        zone_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CareLogEntry>, StoreError>;

    /// Most recent reading per metric.
    async fn latest_sensor_readings(&self, zone_id: &str)
    -> Result<Vec<SensorReading>, StoreError>;

    /// Newest photos of the zone or any of its plants.
    async fn recent_photos(&self, zone_id: &str, limit: usize)
    -> Result<Vec<PhotoRecord>, StoreError>;

    /// `None` when the user has no profile.
    async fn skill_level(&self, user_id: &str) -> Result<Option<SkillLevel>, StoreError>;

    async fn provider_credential(
        &self,
        user_id: &str,
        role: ProviderRole,
    ) -> Result<Option<EncryptedCredential>, StoreError>;

    async fn cached_weather(&self, garden_id: &str) -> Result<Option<CachedWeather>, StoreError>;

    /// Replace the cache row for `garden_id`.
    async fn store_weather(
        &self,
        garden_id: &str,
        snapshot: &WeatherSnapshot,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Pending tasks of the zone, soonest first.
    async fn pending_tasks(&self, zone_id: &str) -> Result<Vec<Task>, StoreError>;

    async fn task(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// Insert a new pending task. Always creates a new row.
    async fn insert_task(
        &self,
        scope: &TaskScope,
        create: &CreateTask,
        analysis_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError>;

    /// Apply the present fields of `update` if the task is pending and in
    /// `zone_id`. Returns `false` when the guard did not match.
    async fn update_pending_task(
        &self,
        zone_id: &str,
        update: &TaskUpdate,
        analysis_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Move a pending task in `zone_id` to a terminal state. Returns `false`
    /// when the guard did not match. `analysis_id` is kept unchanged when
    /// `None`.
    async fn close_pending_task(
        &self,
        zone_id: &str,
        task_id: &str,
        close: &TaskClose,
        analysis_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Write an immutable audit row.
    async fn insert_analysis(
        &self,
        record: &NewAnalysisRecord,
        now: DateTime<Utc>,
    ) -> Result<AnalysisRecord, StoreError>;

    /// Newest audit rows of the garden.
    async fn recent_analyses(
        &self,
        garden_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>, StoreError>;
}

/// The gardener marked a task done. Returns `false` if it was not pending.
pub async fn complete_task_by_user(
    store: &dyn GardenStore,
    zone_id: &str,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let close = TaskClose {
        status: TaskStatus::Completed,
        via: CompletedVia::User,
        reason: None,
        at: now,
    };
    store.close_pending_task(zone_id, task_id, &close, None).await
}

/// The gardener dismissed a task. Returns `false` if it was not pending.
pub async fn dismiss_task_by_user(
    store: &dyn GardenStore,
    zone_id: &str,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let close = TaskClose {
        status: TaskStatus::Cancelled,
        via: CompletedVia::UserDismissed,
        reason: None,
        at: now,
    };
    store.close_pending_task(zone_id, task_id, &close, None).await
}
