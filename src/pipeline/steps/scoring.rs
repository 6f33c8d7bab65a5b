// file: src/pipeline/steps/scoring.rs
// description: deterministic 0-100 complexity score from documents, intake findings and precedent
// reference: internal pipeline design

use crate::error::Result;
use crate::models::prediction::{SCORE_MAX, SCORE_MIN};
use crate::pipeline::context::{ContextKey, ExtractedContent, PipelineContext};
use crate::pipeline::step::{PipelineStep, StepResources};
use crate::utils::Validator;
use async_trait::async_trait;
use serde_json::{Value, json};

const CHARS_PER_POINT: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexityFactors {
    pub documents: f64,
    pub volume: f64,
    pub parties: f64,
    pub issues: f64,
    pub precedent: f64,
}

impl ComplexityFactors {
    pub fn from_inputs(content: &ExtractedContent, intake: &Value, case_law_matches: usize) -> Self {
        let chars = content.combined_text.chars().count();
        let parties = intake["parties"].as_array().map_or(0, Vec::len);
        let issues = Validator::validate_string_list(&intake["legal_issues"]).len();

        Self {
            documents: content.document_count.min(10) as f64 * 3.0,
            volume: (chars / CHARS_PER_POINT).min(20) as f64,
            parties: parties.min(6) as f64 * 3.0,
            issues: issues.min(8) as f64 * 2.5,
            precedent: case_law_matches.min(10) as f64 * 1.2,
        }
    }

    pub fn total(&self) -> f64 {
        (self.documents + self.volume + self.parties + self.issues + self.precedent)
            .clamp(SCORE_MIN, SCORE_MAX)
    }
}

/// Blends the local factor score with a complexity estimate from intake, when present.
pub fn complexity_score(factors: &ComplexityFactors, intake: &Value) -> f64 {
    let local = factors.total();
    match intake.get("complexity_score") {
        Some(raw) => {
            let reported = Validator::validate_numeric(raw, local, SCORE_MIN, SCORE_MAX);
            ((local + reported) / 2.0 * 10.0).round() / 10.0
        }
        None => (local * 10.0).round() / 10.0,
    }
}

pub struct ComplexityScoringStep;

#[async_trait]
impl PipelineStep for ComplexityScoringStep {
    fn name(&self) -> &'static str {
        "complexity_scoring"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[
            ContextKey::ExtractedContent,
            ContextKey::IntakeAnalysis,
            ContextKey::CourtListenerCases,
        ]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::ComplexityScore]
    }

    async fn run(&self, ctx: &mut PipelineContext, _resources: &StepResources) -> Result<Value> {
        let intake = ctx.require_intake()?;
        let factors = ComplexityFactors::from_inputs(
            ctx.require_extracted_content()?,
            intake,
            ctx.require_case_law()?.len(),
        );
        let score = complexity_score(&factors, intake);

        ctx.complexity_score = Some(score);
        Ok(json!({
            "complexity_score": score,
            "factors": {
                "documents": factors.documents,
                "volume": factors.volume,
                "parties": factors.parties,
                "issues": factors.issues,
                "precedent": factors.precedent,
            },
        }))
    }
}
