//! Trigger job: one garden job per garden.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::jobs::{GARDEN_JOB, GardenJob, TriggerJob};
use crate::queue::{self, Job, JobHandler, JobOptions, JobQueue};
use crate::store::GardenStore;

/// Fans the daily run out to every garden.
pub struct TriggerHandler {
    store: Arc<dyn GardenStore>,
    queue: Arc<dyn JobQueue>,
    garden_options: JobOptions,
}

impl TriggerHandler {
    pub fn new(
        store: Arc<dyn GardenStore>,
        queue: Arc<dyn JobQueue>,
        garden_options: JobOptions,
    ) -> Self {
        Self {
            store,
            queue,
            garden_options,
        }
    }
}

#[async_trait]
impl JobHandler for TriggerHandler {
    async fn handle(&self, job: &Job) -> crate::Result<()> {
        let trigger: TriggerJob = job.payload()?;
        let gardens = self.store.list_gardens().await?;
        for garden in &gardens {
            let payload = GardenJob {
                garden_id: garden.id.clone(),
            };
            queue::send(self.queue.as_ref(), GARDEN_JOB, &payload, self.garden_options).await?;
        }
        info!(slot = ?trigger.slot, gardens = gardens.len(), "garden jobs enqueued");
        Ok(())
    }
}
