//! Entities read and written by the analysis pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::{ActionType, AnalysisResult, Priority, TargetType};
use crate::llm::provider::ProviderRole;
use crate::weather::WeatherSnapshot;

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// A garden owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Garden {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Unset when the user never shared a location; weather is skipped.
    pub location: Option<GeoPoint>,
    /// Climate descriptor, e.g. USDA hardiness zone `"8b"`.
    pub hardiness_zone: Option<String>,
}

/// A bed, container or other sub-area of a garden. The unit of analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub garden_id: String,
    pub name: String,
    pub soil_type: Option<String>,
    pub sun_exposure: Option<String>,
    pub notes: Option<String>,
}

/// A plant growing in a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: String,
    pub zone_id: String,
    pub name: String,
    pub variety: Option<String>,
    pub planted_on: Option<NaiveDate>,
    pub growth_stage: Option<String>,
    /// Freeform care profile (water needs, feeding schedule, ...).
    pub care_profile: Option<String>,
}

/// Something the gardener did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareLogEntry {
    pub id: String,
    pub zone_id: String,
    pub plant_id: Option<String>,
    pub action: String,
    pub notes: Option<String>,
    pub performed_at: DateTime<Utc>,
}

/// Latest value of one sensor metric in a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub zone_id: String,
    /// Metric name, e.g. `"soil_moisture"`.
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

/// Metadata of a stored photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub zone_id: String,
    pub plant_id: Option<String>,
    /// Object key in the photo bucket.
    pub storage_key: String,
    pub caption: Option<String>,
    pub taken_at: DateTime<Utc>,
}

/// How much explanation the gardener wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Expert,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Expert => "expert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }
}

/// Task lifecycle state. Only `Pending` tasks accept mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Who closed a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedVia {
    /// Closed by a reconciliation `complete` or `cancel` operation.
    Ai,
    /// Marked done by the gardener.
    User,
    /// Dismissed by the gardener.
    UserDismissed,
}

impl CompletedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::User => "user",
            Self::UserDismissed => "user_dismissed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ai" => Some(Self::Ai),
            "user" => Some(Self::User),
            "user_dismissed" => Some(Self::UserDismissed),
            _ => None,
        }
    }
}

/// A recommended care action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub garden_id: String,
    pub zone_id: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub action_type: ActionType,
    pub priority: Priority,
    pub status: TaskStatus,
    pub label: String,
    pub suggested_date: NaiveDate,
    pub context: Option<String>,
    /// Opaque annotation; nothing schedules from it.
    pub recurrence: Option<String>,
    pub request_photo: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_via: Option<CompletedVia>,
    /// Audit record that most recently created or changed the task.
    pub analysis_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// True while the task still accepts updates.
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// The garden and zone a batch of task writes is confined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskScope {
    pub garden_id: String,
    pub zone_id: String,
}

impl TaskScope {
    pub fn new(garden_id: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            garden_id: garden_id.into(),
            zone_id: zone_id.into(),
        }
    }
}

/// Terminal transition applied to a pending task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskClose {
    /// `Completed` or `Cancelled`.
    pub status: TaskStatus,
    pub via: CompletedVia,
    /// Replaces the task context when present.
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Granularity an analysis covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisScope {
    Zone,
}

impl AnalysisScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
        }
    }
}

/// Audit row written once per zone analysis, before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysisRecord {
    pub garden_id: String,
    pub zone_id: String,
    pub user_id: String,
    pub scope: AnalysisScope,
    pub provider: ProviderRole,
    pub model_used: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub result: AnalysisResult,
}

/// A persisted, immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub garden_id: String,
    pub zone_id: String,
    pub user_id: String,
    pub scope: AnalysisScope,
    pub provider: ProviderRole,
    pub model_used: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
}

/// Weather cache row for one garden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedWeather {
    pub garden_id: String,
    pub snapshot: WeatherSnapshot,
    pub fetched_at: DateTime<Utc>,
}

impl CachedWeather {
    /// True when the row is younger than `max_age`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < max_age
    }
}
