//! Garden job: refresh weather, then one zone job per zone.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::jobs::{GardenJob, ZONE_JOB, ZoneJob};
use crate::queue::{self, Job, JobHandler, JobOptions, JobQueue};
use crate::store::{Garden, GardenStore};
use crate::weather::{WeatherSnapshot, WeatherSource};

/// Loads a garden, resolves weather and fans out to its zones.
pub struct GardenHandler {
    store: Arc<dyn GardenStore>,
    queue: Arc<dyn JobQueue>,
    weather: Arc<dyn WeatherSource>,
    /// Cached weather younger than this is reused.
    staleness: Duration,
    zone_options: JobOptions,
}

impl GardenHandler {
    pub fn new(
        store: Arc<dyn GardenStore>,
        queue: Arc<dyn JobQueue>,
        weather: Arc<dyn WeatherSource>,
        staleness: Duration,
        zone_options: JobOptions,
    ) -> Self {
        Self {
            store,
            queue,
            weather,
            staleness,
            zone_options,
        }
    }

    /// Cached snapshot if fresh, else a fetched one. Every failure here is
    /// logged and yields `None`.
    async fn resolve_weather(
        &self,
        garden: &Garden,
        now: DateTime<Utc>,
    ) -> Option<WeatherSnapshot> {
        let location = garden.location?;

        match self.store.cached_weather(&garden.id).await {
            Ok(Some(cached)) if cached.is_fresh(now, self.staleness) => {
                debug!(garden_id = %garden.id, fetched_at = %cached.fetched_at, "using cached weather");
                return Some(cached.snapshot);
            }
            Ok(_) => {}
            Err(e) => warn!(garden_id = %garden.id, error = %e, "weather cache unreadable"),
        }

        let snapshot = match self.weather.fetch(location.lat, location.lng).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(garden_id = %garden.id, error = %e, "weather fetch failed; continuing without");
                return None;
            }
        };
        if let Err(e) = self.store.store_weather(&garden.id, &snapshot, now).await {
            warn!(garden_id = %garden.id, error = %e, "weather cache write failed");
        }
        Some(snapshot)
    }
}

#[async_trait]
impl JobHandler for GardenHandler {
    async fn handle(&self, job: &Job) -> crate::Result<()> {
        let GardenJob { garden_id } = job.payload()?;
        let Some(garden) = self.store.garden(&garden_id).await? else {
            warn!(garden_id = %garden_id, "garden no longer exists; nothing to analyze");
            return Ok(());
        };

        let weather = self.resolve_weather(&garden, Utc::now()).await;
        let zones = self.store.zones_for_garden(&garden.id).await?;
        for zone in &zones {
            let payload = ZoneJob {
                garden_id: garden.id.clone(),
                zone_id: zone.id.clone(),
                user_id: garden.user_id.clone(),
                weather: weather.clone(),
            };
            queue::send(self.queue.as_ref(), ZONE_JOB, &payload, self.zone_options).await?;
        }
        info!(
            garden_id = %garden_id,
            zones = zones.len(),
            has_weather = weather.is_some(),
            "zone jobs enqueued"
        );
        Ok(())
    }
}
