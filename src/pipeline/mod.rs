//! Scheduled analysis pipeline.
//!
//! ```text
//! daily schedule ─► trigger ─► garden (×N gardens) ─► zone (×M zones)
//!                                 │ weather cache        │ select provider
//!                                 ▼                      │ build context
//!                              fan out                   │ analyze, audit
//!                                                        ▼ reconcile tasks
//! ```
//!
//! Each stage is a job kind on the durable queue with its own worker loops
//! and retry policy. Stages share no in-process state.

pub mod garden;
pub mod jobs;
pub mod schedule;
pub mod selection;
pub mod service;
pub mod trigger;
pub mod zone;

pub use garden::GardenHandler;
pub use jobs::{
    GARDEN_JOB, GardenJob, RetryPolicies, TRIGGER_JOB, TriggerJob, ZONE_JOB, ZoneJob,
};
pub use schedule::{DailySchedule, fire_if_due, spawn_daily_trigger};
pub use selection::{Selection, select_provider};
pub use service::{AnalysisService, AnalysisStatus};
pub use trigger::TriggerHandler;
pub use zone::{ZoneHandler, ZoneOutcome};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::context::{ContextBuilder, ContextSettings};
use crate::credentials::KeyUnwrapper;
use crate::llm::Providers;
use crate::photos::PhotoSource;
use crate::queue::{
    BatchReport, JobHandler, JobQueue, QueueError, WorkerOptions, on_batch, process_batch,
};
use crate::store::GardenStore;
use crate::weather::WeatherSource;

/// Worker loop settings per job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub trigger: WorkerOptions,
    pub garden: WorkerOptions,
    pub zone: WorkerOptions,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            trigger: WorkerOptions::default(),
            garden: WorkerOptions::default(),
            zone: WorkerOptions {
                concurrency: 4,
                ..WorkerOptions::default()
            },
        }
    }
}

/// Tunables of the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSettings {
    pub schedule: DailySchedule,
    pub workers: WorkerSettings,
    pub retry: RetryPolicies,
    pub context: ContextSettings,
    /// Cached weather younger than this is reused.
    pub weather_staleness: Option<chrono::Duration>,
}

/// Default weather staleness window: 3 hours.
pub const DEFAULT_WEATHER_STALENESS_SECS: i64 = 3 * 60 * 60;

/// External collaborators the pipeline calls into.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn GardenStore>,
    pub queue: Arc<dyn JobQueue>,
    pub providers: Providers,
    pub unwrapper: Arc<dyn KeyUnwrapper>,
    pub weather: Arc<dyn WeatherSource>,
    pub photos: Arc<dyn PhotoSource>,
}

/// The assembled pipeline: one handler per job kind over a shared queue.
pub struct Pipeline {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn GardenStore>,
    trigger: Arc<TriggerHandler>,
    garden: Arc<GardenHandler>,
    zone: Arc<ZoneHandler>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        let staleness = settings
            .weather_staleness
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_WEATHER_STALENESS_SECS));
        let trigger = TriggerHandler::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.queue),
            settings.retry.garden,
        );
        let garden = GardenHandler::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.queue),
            deps.weather,
            staleness,
            settings.retry.zone,
        );
        let context = ContextBuilder::new(
            Arc::clone(&deps.store),
            deps.photos,
            settings.context.clone(),
        );
        let zone = ZoneHandler::new(
            Arc::clone(&deps.store),
            deps.providers,
            deps.unwrapper,
            context,
        );
        Self {
            queue: deps.queue,
            store: deps.store,
            trigger: Arc::new(trigger),
            garden: Arc::new(garden),
            zone: Arc::new(zone),
            settings,
        }
    }

    /// On-demand operations sharing this pipeline's store and queue.
    pub fn service(&self) -> AnalysisService {
        AnalysisService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.settings.retry.garden,
        )
    }

    /// Spawn worker loops for every job kind plus the daily schedule.
    pub fn start(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let workers = self.settings.workers;
        let mut handles = Vec::new();
        for (name, handler, options) in self.stages(workers) {
            handles.extend(on_batch(
                Arc::clone(&self.queue),
                name,
                handler,
                options,
                cancel.child_token(),
            ));
        }
        handles.push(spawn_daily_trigger(
            Arc::clone(&self.queue),
            self.settings.schedule,
            self.settings.retry.trigger,
            cancel.child_token(),
        ));
        info!(workers = handles.len() - 1, "analysis pipeline started");
        handles
    }

    /// Process every job that is due right now, stage by stage, until the
    /// queue has nothing fetchable left. Jobs rescheduled with a retry delay
    /// are left for later.
    pub async fn drain(&self) -> Result<BatchReport, QueueError> {
        let mut total = BatchReport::default();
        loop {
            let mut round = BatchReport::default();
            for (name, handler, options) in self.stages(self.settings.workers) {
                let report =
                    process_batch(self.queue.as_ref(), name, handler.as_ref(), options.batch_size)
                        .await?;
                round.merge(&report);
            }
            if round.total() == 0 {
                return Ok(total);
            }
            total.merge(&round);
        }
    }

    fn stages(
        &self,
        workers: WorkerSettings,
    ) -> [(&'static str, Arc<dyn JobHandler>, WorkerOptions); 3] {
        [
            (TRIGGER_JOB, self.trigger.clone() as Arc<dyn JobHandler>, workers.trigger),
            (GARDEN_JOB, self.garden.clone() as Arc<dyn JobHandler>, workers.garden),
            (ZONE_JOB, self.zone.clone() as Arc<dyn JobHandler>, workers.zone),
        ]
    }
}
