//! Analysis context: the immutable snapshot handed to a provider.
//!
//! Built fresh for every zone job and discarded after the call. Optional
//! inputs (sensors, photos) degrade to empty with a warning instead of
//! failing the build.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::provider::ImageRef;
use crate::photos::PhotoSource;
use crate::store::{
    CareLogEntry, Garden, GardenStore, Plant, SensorReading, SkillLevel, StoreError, Task, Zone,
};
use crate::weather::WeatherSnapshot;

/// Everything a provider sees about one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisContext {
    pub garden: Garden,
    pub zone: Zone,
    pub plants: Vec<Plant>,
    /// Newest first.
    pub care_log: Vec<CareLogEntry>,
    pub sensors: Vec<SensorReading>,
    pub weather: Option<WeatherSnapshot>,
    pub photos: Vec<ImageRef>,
    /// Tasks the model may reference by id.
    pub pending_tasks: Vec<Task>,
    pub today: NaiveDate,
    pub skill_level: SkillLevel,
}

/// Limits applied while gathering history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Care-log look-back window in days.
    pub care_log_days: u32,
    /// Maximum care-log entries.
    pub max_care_logs: usize,
    /// Maximum photos attached.
    pub max_photos: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            care_log_days: 14,
            max_care_logs: 50,
            max_photos: 4,
        }
    }
}

/// Context build failures. Optional inputs never produce one.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("garden not found: {0}")]
    GardenNotFound(String),

    #[error("zone {zone_id} not found in garden {garden_id}")]
    ZoneNotFound { garden_id: String, zone_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gathers an [`AnalysisContext`] from the store and photo source.
pub struct ContextBuilder {
    store: Arc<dyn GardenStore>,
    photos: Arc<dyn PhotoSource>,
    settings: ContextSettings,
}

impl ContextBuilder {
    pub fn new(
        store: Arc<dyn GardenStore>,
        photos: Arc<dyn PhotoSource>,
        settings: ContextSettings,
    ) -> Self {
        Self {
            store,
            photos,
            settings,
        }
    }

    /// Build the context for `zone_id`. `weather` comes from the garden job
    /// and is never re-fetched here.
    pub async fn build(
        &self,
        garden_id: &str,
        zone_id: &str,
        user_id: &str,
        weather: Option<WeatherSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<AnalysisContext, ContextError> {
        let garden = self
            .store
            .garden(garden_id)
            .await?
            .ok_or_else(|| ContextError::GardenNotFound(garden_id.to_owned()))?;
        let zone = self.store.zone(garden_id, zone_id).await?.ok_or_else(|| {
            ContextError::ZoneNotFound {
                garden_id: garden_id.to_owned(),
                zone_id: zone_id.to_owned(),
            }
        })?;

        let plants = self.store.plants_for_zone(zone_id).await?;
        let since = now - Duration::days(i64::from(self.settings.care_log_days));
        let care_log = self
            .store
            .recent_care_logs(zone_id, since, self.settings.max_care_logs)
            .await?;
        let pending_tasks = self.store.pending_tasks(zone_id).await?;
        let skill_level = self.store.skill_level(user_id).await?.unwrap_or_default();

        let sensors = match self.store.latest_sensor_readings(zone_id).await {
            Ok(readings) => readings,
            Err(e) => {
                warn!(zone_id, error = %e, "sensor readings unavailable; continuing without");
                Vec::new()
            }
        };

        let photos = match self.photos.zone_photos(zone_id, self.settings.max_photos).await {
            Ok(photos) => photos,
            Err(e) => {
                warn!(zone_id, error = %e, "photo gathering failed; continuing without photos");
                Vec::new()
            }
        };

        debug!(
            zone_id,
            plants = plants.len(),
            care_log = care_log.len(),
            photos = photos.len(),
            pending = pending_tasks.len(),
            has_weather = weather.is_some(),
            "analysis context built"
        );

        Ok(AnalysisContext {
            garden,
            zone,
            plants,
            care_log,
            sensors,
            weather,
            photos,
            pending_tasks,
            today: now.date_naive(),
            skill_level,
        })
    }
}
