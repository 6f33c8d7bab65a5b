// file: src/pipeline/steps/mod.rs
// description: the canonical case-processing steps in execution order
// reference: internal module structure

pub mod analysis;
pub mod case_law;
pub mod documents;
pub mod persistence;
pub mod scoring;

use crate::pipeline::step::PipelineStep;
use std::sync::Arc;

pub use analysis::{
    AdditionalAnalysisStep, CaseEnhancementStep, IntakeAnalysisStep, JurisdictionAnalysisStep,
    OpinionAnalysisStep, PredictionAnalysisStep,
};
pub use case_law::{CaseLawRefinementStep, OpinionFetchStep};
pub use documents::DocumentExtractionStep;
pub use persistence::{
    PersistEnhancementStep, PersistIntakeStep, PersistOpinionsStep, PersistPredictionsStep,
};
pub use scoring::ComplexityScoringStep;

pub const STAGE_NAMES: [&str; 14] = [
    "document_extraction",
    "intake_analysis",
    "persist_intake",
    "jurisdiction_analysis",
    "case_enhancement",
    "persist_enhancement",
    "case_law_refinement",
    "opinion_fetch",
    "opinion_analysis",
    "persist_opinions",
    "complexity_scoring",
    "prediction_analysis",
    "additional_analysis",
    "persist_predictions",
];

pub fn default_steps() -> Vec<Arc<dyn PipelineStep>> {
    vec![
        Arc::new(DocumentExtractionStep),
        Arc::new(IntakeAnalysisStep),
        Arc::new(PersistIntakeStep),
        Arc::new(JurisdictionAnalysisStep),
        Arc::new(CaseEnhancementStep),
        Arc::new(PersistEnhancementStep),
        Arc::new(CaseLawRefinementStep),
        Arc::new(OpinionFetchStep),
        Arc::new(OpinionAnalysisStep),
        Arc::new(PersistOpinionsStep),
        Arc::new(ComplexityScoringStep),
        Arc::new(PredictionAnalysisStep),
        Arc::new(AdditionalAnalysisStep),
        Arc::new(PersistPredictionsStep),
    ]
}
