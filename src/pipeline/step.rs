// file: src/pipeline/step.rs
// description: the unit of work the orchestrator sequences, tagged with its failure policy
// reference: https://docs.rs/async-trait

use crate::config::PipelineConfig;
use crate::database::CaseStore;
use crate::error::{PipelineError, Result};
use crate::pipeline::context::{ContextKey, PipelineContext};
use crate::services::PipelineServices;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// What the orchestrator does when a step returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run and mark the case failed.
    FailFast,
    /// Ask the step for fallback data, record the stage as failed and continue.
    SoftFail,
}

/// Shared handles every step can use.
#[derive(Clone)]
pub struct StepResources {
    pub store: Arc<dyn CaseStore>,
    pub services: PipelineServices,
    pub config: PipelineConfig,
}

#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Stage name recorded by the tracker.
    fn name(&self) -> &'static str;

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailFast
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[]
    }

    /// Runs the step, filling the slots it produces. The returned value is stored as the stage result.
    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value>;

    /// Fills the produced slots with fallback data after `run` failed. Only called for
    /// soft-fail steps; the returned value is stored with the failed stage.
    async fn recover(
        &self,
        _ctx: &mut PipelineContext,
        _resources: &StepResources,
        error: &PipelineError,
    ) -> Result<Value> {
        Err(PipelineError::Validation(format!(
            "step '{}' has no fallback for: {}",
            self.name(),
            error
        )))
    }
}
