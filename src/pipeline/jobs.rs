//! Job kinds, payloads and delivery policies.

use serde::{Deserialize, Serialize};

use crate::queue::JobOptions;
use crate::weather::WeatherSnapshot;

/// Daily trigger: enumerate gardens.
pub const TRIGGER_JOB: &str = "analysis.trigger";
/// One garden: weather, then fan out to zones.
pub const GARDEN_JOB: &str = "analysis.garden";
/// One zone: analyze and reconcile.
pub const ZONE_JOB: &str = "analysis.zone";

/// JSON path of the garden id in garden and zone payloads.
pub const GARDEN_ID_PATH: &str = "$.gardenId";

/// Payload of [`TRIGGER_JOB`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJob {
    /// Schedule slot that fired, e.g. `2025-06-01`. Absent for manual runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

/// Payload of [`GARDEN_JOB`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenJob {
    pub garden_id: String,
}

/// Payload of [`ZONE_JOB`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneJob {
    pub garden_id: String,
    pub zone_id: String,
    /// Owner of the garden; selects credentials and skill level.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSnapshot>,
}

/// Delivery policies per job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    pub trigger: JobOptions,
    pub garden: JobOptions,
    pub zone: JobOptions,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            trigger: JobOptions::no_retry(),
            garden: JobOptions {
                retry_limit: 2,
                retry_delay_secs: 60,
                expire_in_secs: 300,
            },
            zone: JobOptions {
                retry_limit: 3,
                retry_delay_secs: 60,
                expire_in_secs: 600,
            },
        }
    }
}
