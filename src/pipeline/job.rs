// file: src/pipeline/job.rs
// description: adapts the orchestrator to the job queue
// reference: https://docs.rs/async-trait

use crate::error::{PipelineError, Result};
use crate::models::Job;
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::queue::JobHandler;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJobPayload {
    pub case_id: String,
}

impl PipelineJobPayload {
    pub fn new(case_id: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
        }
    }

    pub fn from_job(job: &Job) -> Result<Self> {
        serde_json::from_value(job.payload.clone()).map_err(|e| {
            PipelineError::Validation(format!("job {} has an invalid payload: {}", job.id, e))
        })
    }

    pub fn to_value(&self) -> Value {
        json!({ "case_id": self.case_id })
    }
}

pub struct PipelineJobHandler {
    orchestrator: Arc<PipelineOrchestrator>,
}

impl PipelineJobHandler {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for PipelineJobHandler {
    async fn handle(&self, job: &Job) -> Result<Value> {
        let payload = PipelineJobPayload::from_job(job)?;
        info!(
            "Job {} running pipeline for case {} (attempt {}/{})",
            job.id, payload.case_id, job.attempts, job.max_attempts
        );

        let ctx = self.orchestrator.run_pipeline(&payload.case_id).await?;

        Ok(json!({
            "case_id": ctx.case_id,
            "complexity_score": ctx.complexity_score,
            "prediction_source": ctx.prediction_analysis.as_ref().map(|p| p.source),
            "case_law_matches": ctx.court_listener_cases.as_ref().map_or(0, Vec::len),
        }))
    }
}
