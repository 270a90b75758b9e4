//! On-demand entry points: trigger, status, history.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::jobs::{GARDEN_ID_PATH, GARDEN_JOB, GardenJob, ZONE_JOB};
use crate::error::PlotwiseError;
use crate::queue::{self, JobOptions, JobQueue};
use crate::store::{AnalysisRecord, GardenStore};

/// In-flight work for one garden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatus {
    pub garden_jobs: u64,
    pub zone_jobs: u64,
}

impl AnalysisStatus {
    /// True while any garden or zone job is queued or running.
    pub fn is_running(&self) -> bool {
        self.garden_jobs + self.zone_jobs > 0
    }
}

/// Analysis operations exposed to the rest of the application.
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn GardenStore>,
    queue: Arc<dyn JobQueue>,
    garden_options: JobOptions,
}

impl AnalysisService {
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

    /// Enqueue a garden job now. Duplicate requests are not collapsed.
    pub async fn trigger_analysis(&self, garden_id: &str) -> crate::Result<String> {
        if self.store.garden(garden_id).await?.is_none() {
            return Err(PlotwiseError::GardenNotFound(garden_id.to_owned()));
        }
        let payload = GardenJob {
            garden_id: garden_id.to_owned(),
        };
        let job_id =
            queue::send(self.queue.as_ref(), GARDEN_JOB, &payload, self.garden_options).await?;
        info!(garden_id, job_id = %job_id, "analysis triggered on demand");
        Ok(job_id)
    }

    pub async fn analysis_status(&self, garden_id: &str) -> crate::Result<AnalysisStatus> {
        Ok(AnalysisStatus {
            garden_jobs: self
                .queue
                .count_in_flight(GARDEN_JOB, GARDEN_ID_PATH, garden_id)
                .await?,
            zone_jobs: self
                .queue
                .count_in_flight(ZONE_JOB, GARDEN_ID_PATH, garden_id)
                .await?,
        })
    }

    /// Newest audit records of the garden.
    pub async fn recent_analyses(
        &self,
        garden_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<AnalysisRecord>> {
        Ok(self.store.recent_analyses(garden_id, limit).await?)
    }
}
