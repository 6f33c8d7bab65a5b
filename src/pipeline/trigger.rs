// file: src/pipeline/trigger.rs
// description: entry points that enqueue pipeline runs for a case
// reference: internal pipeline design

use crate::config::QueueConfig;
use crate::database::CaseStore;
use crate::error::{PipelineError, Result};
use crate::models::{CaseDocument, CaseStatusUpdate, Job, PredictionRow, ProcessingStatus};
use crate::pipeline::job::PipelineJobPayload;
use crate::queue::JobQueue;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// What a prediction read returns: the stored row, if any, and the job scheduled to refresh it.
#[derive(Debug, Clone)]
pub struct PredictionRead {
    pub prediction: Option<PredictionRow>,
    pub refresh_job: Option<Job>,
}

pub struct CaseTrigger {
    store: Arc<dyn CaseStore>,
    queue: Arc<JobQueue>,
    queue_name: String,
    priority: i32,
    stale_after: Duration,
}

impl CaseTrigger {
    pub fn new(
        store: Arc<dyn CaseStore>,
        queue: Arc<JobQueue>,
        config: &QueueConfig,
        stale_after_hours: i64,
    ) -> Self {
        Self {
            store,
            queue,
            queue_name: config.pipeline_queue.clone(),
            priority: config.pipeline_priority,
            stale_after: Duration::hours(stale_after_hours),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Called after a document row is inserted for a case.
    pub async fn on_document_inserted(&self, document: &CaseDocument) -> Result<Option<Job>> {
        debug!(
            "Document {} inserted for case {}",
            document.file_name, document.case_id
        );
        self.enqueue_case(&document.case_id, false).await
    }

    pub async fn trigger_manual(&self, case_id: &str, force: bool) -> Result<Option<Job>> {
        self.enqueue_case(case_id, force).await
    }

    /// Returns the stored prediction and schedules a refresh when it is missing or stale.
    pub async fn read_prediction(&self, case_id: &str) -> Result<PredictionRead> {
        let prediction = self.store.get_prediction(case_id).await?;

        let stale = match &prediction {
            None => true,
            Some(row) => Utc::now() - row.updated_at > self.stale_after,
        };

        let refresh_job = if stale {
            self.enqueue_case(case_id, false).await?
        } else {
            None
        };

        Ok(PredictionRead {
            prediction,
            refresh_job,
        })
    }

    async fn enqueue_case(&self, case_id: &str, force: bool) -> Result<Option<Job>> {
        let case = self
            .store
            .get_case(case_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("case {}", case_id)))?;

        if case.processing_status.is_active() && !force {
            info!(
                "Case {} is already {}, not enqueueing another run",
                case_id, case.processing_status
            );
            return Ok(None);
        }

        self.store
            .update_case_status(case_id, CaseStatusUpdate::status(ProcessingStatus::Queued))
            .await?;

        let options = self.queue.default_options().with_priority(self.priority);
        let job = self
            .queue
            .enqueue(
                &self.queue_name,
                PipelineJobPayload::new(case_id).to_value(),
                options,
            )
            .await?;

        Ok(Some(job))
    }
}
