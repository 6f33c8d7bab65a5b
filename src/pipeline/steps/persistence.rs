// file: src/pipeline/steps/persistence.rs
// description: steps that write accumulated analyses to the case store
// reference: keyed upserts by (case, analysis type)

use crate::error::Result;
use crate::models::{AnalysisKind, AnalysisRecord, PredictionRow};
use crate::pipeline::context::{ContextKey, PipelineContext};
use crate::pipeline::step::{PipelineStep, StepResources};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

async fn persist(
    resources: &StepResources,
    ctx: &PipelineContext,
    kind: AnalysisKind,
    data: Value,
) -> Result<()> {
    resources
        .store
        .upsert_analysis(AnalysisRecord::new(&ctx.case_id, kind, data))
        .await
}

pub struct PersistIntakeStep;

#[async_trait]
impl PipelineStep for PersistIntakeStep {
    fn name(&self) -> &'static str {
        "persist_intake"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::IntakeAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let intake = ctx.require_intake()?.clone();
        persist(resources, ctx, AnalysisKind::Intake, intake).await?;
        Ok(json!({ "persisted": [AnalysisKind::Intake.as_str()] }))
    }
}

/// Stores the enhancement together with the case-law candidates found for it.
pub struct PersistEnhancementStep;

#[async_trait]
impl PipelineStep for PersistEnhancementStep {
    fn name(&self) -> &'static str {
        "persist_enhancement"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::CaseEnhancement]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let data = json!({
            "enhancement": ctx.require_enhancement()?,
            "case_law": ctx.court_listener_cases,
        });
        persist(resources, ctx, AnalysisKind::CaseEnhancement, data).await?;

        if let Some(jurisdiction) = ctx.jurisdiction_analysis.clone() {
            persist(resources, ctx, AnalysisKind::Jurisdiction, jurisdiction).await?;
        }
        Ok(json!({
            "persisted": [
                AnalysisKind::CaseEnhancement.as_str(),
                AnalysisKind::Jurisdiction.as_str(),
            ],
        }))
    }
}

pub struct PersistOpinionsStep;

#[async_trait]
impl PipelineStep for PersistOpinionsStep {
    fn name(&self) -> &'static str {
        "persist_opinions"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::OpinionAnalysis, ContextKey::CourtListenerCases]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let cases = ctx.require_case_law()?;
        let data = json!({
            "analysis": ctx.require_opinion_analysis()?,
            "case_law": cases,
            "opinions_fetched": ctx.opinion_texts.as_ref().map_or(0, Vec::len),
        });
        let count = cases.len();

        persist(resources, ctx, AnalysisKind::OpinionAnalysis, data).await?;
        Ok(json!({ "case_law": count }))
    }
}

/// Writes the prediction row plus one analysis record per auxiliary analysis.
pub struct PersistPredictionsStep;

#[async_trait]
impl PipelineStep for PersistPredictionsStep {
    fn name(&self) -> &'static str {
        "persist_predictions"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::PredictionAnalysis, ContextKey::AdditionalAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let prediction = ctx.require_prediction()?.clone();
        let additional = ctx.require_additional()?.to_vec();

        persist(
            resources,
            ctx,
            AnalysisKind::Prediction,
            serde_json::to_value(&prediction)?,
        )
        .await?;

        let source = prediction.source;
        resources
            .store
            .upsert_prediction(PredictionRow {
                case_id: ctx.case_id.clone(),
                prediction,
                updated_at: Utc::now(),
            })
            .await?;

        let count = additional.len();
        for record in additional {
            resources.store.upsert_analysis(record).await?;
        }

        Ok(json!({
            "prediction_source": source,
            "additional_analyses": count,
        }))
    }
}
