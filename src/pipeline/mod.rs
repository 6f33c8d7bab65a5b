// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

pub mod builder;
pub mod context;
pub mod job;
pub mod orchestrator;
pub mod step;
pub mod steps;
pub mod tracker;
pub mod trigger;

pub use builder::{Pipeline, PipelineBuilder};
pub use context::{ContextKey, ExtractedContent, PipelineContext};
pub use job::{PipelineJobHandler, PipelineJobPayload};
pub use orchestrator::PipelineOrchestrator;
pub use step::{FailurePolicy, PipelineStep, StepResources};
pub use steps::{STAGE_NAMES, default_steps};
pub use tracker::{StageTracker, compute_progress};
pub use trigger::{CaseTrigger, PredictionRead};
