// file: src/pipeline/steps/analysis.rs
// description: steps that send the accumulated context to the language-analysis service
// reference: https://docs.rs/futures

use crate::error::{PipelineError, Result};
use crate::models::{AnalysisKind, AnalysisRecord, Level, PredictionRecord};
use crate::pipeline::context::{ContextKey, PipelineContext};
use crate::pipeline::step::{FailurePolicy, PipelineStep, StepResources};
use crate::pipeline::steps::case_law::{search_case_law, search_terms};
use crate::services::AnalysisRequest;
use crate::utils::Validator;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

const MAX_PROMPT_CHARS: usize = 20_000;
const MAX_OPINION_CHARS: usize = 4_000;

async fn analyze(
    resources: &StepResources,
    ctx: &PipelineContext,
    kind: AnalysisKind,
    context: Value,
) -> Result<Value> {
    let request = AnalysisRequest {
        kind,
        case_id: ctx.case_id.clone(),
        context,
    };
    resources.services.analysis.analyze(request).await
}

fn field_count(value: &Value) -> usize {
    value.as_object().map_or(0, |object| object.len())
}

pub struct IntakeAnalysisStep;

#[async_trait]
impl PipelineStep for IntakeAnalysisStep {
    fn name(&self) -> &'static str {
        "intake_analysis"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::ExtractedContent]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::IntakeAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let content = ctx.require_extracted_content()?;

        let (parties, evidence) = tokio::try_join!(
            resources.store.list_parties(&ctx.case_id),
            resources.store.list_evidence(&ctx.case_id),
        )?;

        let context = json!({
            "case": ctx.case_summary(),
            "documents_text": Validator::truncate_text(&content.combined_text, MAX_PROMPT_CHARS),
            "document_count": content.document_count,
            "parties": parties,
            "evidence": evidence,
        });

        let intake = analyze(resources, ctx, AnalysisKind::Intake, context).await?;
        let summary = json!({
            "parties": parties.len(),
            "evidence": evidence.len(),
            "fields": field_count(&intake),
        });

        ctx.intake_analysis = Some(intake);
        Ok(summary)
    }
}

pub struct JurisdictionAnalysisStep;

#[async_trait]
impl PipelineStep for JurisdictionAnalysisStep {
    fn name(&self) -> &'static str {
        "jurisdiction_analysis"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::IntakeAnalysis]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::JurisdictionAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let context = json!({
            "case": ctx.case_summary(),
            "intake": ctx.require_intake()?,
        });

        let jurisdiction = analyze(resources, ctx, AnalysisKind::Jurisdiction, context).await?;
        let summary = json!({ "fields": field_count(&jurisdiction) });

        ctx.jurisdiction_analysis = Some(jurisdiction);
        Ok(summary)
    }
}

/// Enhances the case profile, then searches case law with the terms it suggests.
pub struct CaseEnhancementStep;

#[async_trait]
impl PipelineStep for CaseEnhancementStep {
    fn name(&self) -> &'static str {
        "case_enhancement"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::IntakeAnalysis, ContextKey::JurisdictionAnalysis]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::CaseEnhancement, ContextKey::CourtListenerCases]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let context = json!({
            "case": ctx.case_summary(),
            "intake": ctx.require_intake()?,
            "jurisdiction": ctx.require_jurisdiction()?,
        });

        let enhancement = analyze(resources, ctx, AnalysisKind::CaseEnhancement, context).await?;

        let terms = search_terms(ctx, &enhancement);
        let court = enhancement
            .get("court")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| ctx.case.court.clone());

        let matches = search_case_law(resources, terms.clone(), court).await?;
        info!(
            "Found {} case-law candidates for case {}",
            matches.len(),
            ctx.case_id
        );

        let summary = json!({
            "search_terms": terms,
            "matches": matches.len(),
        });
        ctx.case_enhancement = Some(enhancement);
        ctx.court_listener_cases = Some(matches);
        Ok(summary)
    }
}

pub struct OpinionAnalysisStep;

#[async_trait]
impl PipelineStep for OpinionAnalysisStep {
    fn name(&self) -> &'static str {
        "opinion_analysis"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::OpinionTexts]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::OpinionAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let opinions = ctx.require_opinion_texts()?;

        if opinions.is_empty() {
            debug!("No opinions to analyze for case {}", ctx.case_id);
            ctx.opinion_analysis = Some(json!({
                "opinions_analyzed": 0,
                "summary": "No related opinions were available",
            }));
            return Ok(json!({ "opinions": 0 }));
        }

        let excerpts: Vec<Value> = opinions
            .iter()
            .map(|opinion| {
                json!({
                    "case_law_id": opinion.case_law_id,
                    "text": Validator::truncate_text(&opinion.text, MAX_OPINION_CHARS),
                })
            })
            .collect();
        let count = excerpts.len();

        let context = json!({
            "case": ctx.case_summary(),
            "opinions": excerpts,
        });
        let analysis = analyze(resources, ctx, AnalysisKind::OpinionAnalysis, context).await?;

        ctx.opinion_analysis = Some(analysis);
        Ok(json!({ "opinions": count }))
    }
}

pub struct PredictionAnalysisStep;

#[async_trait]
impl PipelineStep for PredictionAnalysisStep {
    fn name(&self) -> &'static str {
        "prediction_analysis"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::SoftFail
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::ComplexityScore]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::PredictionAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let context = json!({
            "case": ctx.case_summary(),
            "intake": ctx.intake_analysis,
            "jurisdiction": ctx.jurisdiction_analysis,
            "enhancement": ctx.case_enhancement,
            "opinion_analysis": ctx.opinion_analysis,
            "complexity_score": ctx.require_complexity()?,
            "similar_cases": ctx.court_listener_cases.as_ref().map_or(0, Vec::len),
        });

        let raw = analyze(resources, ctx, AnalysisKind::Prediction, context).await?;
        let record = Validator::validate_prediction(&raw, &ctx.fallback_signals(&resources.config));

        let summary = json!({
            "source": record.source,
            "risk_level": record.risk_level,
            "outcome_prediction_score": record.outcome_prediction_score,
        });
        ctx.prediction_analysis = Some(record);
        Ok(summary)
    }

    async fn recover(
        &self,
        ctx: &mut PipelineContext,
        resources: &StepResources,
        error: &PipelineError,
    ) -> Result<Value> {
        warn!(
            "Prediction analysis unavailable for case {}, using fallback: {}",
            ctx.case_id, error
        );
        let record = Validator::build_fallback_prediction(&ctx.fallback_signals(&resources.config));
        let snapshot = serde_json::to_value(&record)?;
        ctx.prediction_analysis = Some(record);
        Ok(snapshot)
    }
}

/// Cost, risk, settlement, timeline, financial and judge-trend summaries derived from the
/// prediction already in context. Makes no external calls.
pub struct AdditionalAnalysisStep;

#[async_trait]
impl PipelineStep for AdditionalAnalysisStep {
    fn name(&self) -> &'static str {
        "additional_analysis"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::SoftFail
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::PredictionAnalysis]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::AdditionalAnalysis]
    }

    async fn run(&self, ctx: &mut PipelineContext, _resources: &StepResources) -> Result<Value> {
        let prediction = ctx.require_prediction()?;
        let records = derive_auxiliary(&ctx.case_id, prediction, ctx.case.court.as_deref());

        let summary = json!({
            "analyses": records.iter().map(|r| r.analysis_type.as_str()).collect::<Vec<_>>(),
        });
        ctx.additional_analysis = Some(records);
        Ok(summary)
    }

    async fn recover(
        &self,
        ctx: &mut PipelineContext,
        _resources: &StepResources,
        error: &PipelineError,
    ) -> Result<Value> {
        warn!(
            "Additional analyses unavailable for case {}, storing none: {}",
            ctx.case_id, error
        );
        ctx.additional_analysis = Some(Vec::new());
        Ok(json!({ "analyses": [] }))
    }
}

/// Auxiliary analyses computed from the prediction alone.
pub fn derive_auxiliary(
    case_id: &str,
    prediction: &PredictionRecord,
    court: Option<&str>,
) -> Vec<AnalysisRecord> {
    let cost = prediction.estimated_cost;
    let settlement = prediction.settlement_range;
    let timeline = prediction.estimated_timeline_months;
    let expected_recovery = settlement.midpoint() * prediction.settlement_probability / 100.0;

    let judge_trend = match prediction.judge_favorability_score {
        s if s >= 60.0 => "favorable",
        s if s <= 40.0 => "unfavorable",
        _ => "neutral",
    };

    let entries = [
        (
            AnalysisKind::CostEstimate,
            json!({ "min": cost.min, "max": cost.max, "expected": cost.midpoint() }),
        ),
        (
            AnalysisKind::RiskAssessment,
            json!({
                "risk_level": prediction.risk_level,
                "risk_factors": prediction.risk_factors,
                "complexity_score": prediction.complexity_score,
            }),
        ),
        (
            AnalysisKind::SettlementAnalysis,
            json!({
                "probability": prediction.settlement_probability,
                "min": settlement.min,
                "max": settlement.max,
            }),
        ),
        (
            AnalysisKind::TimelineEstimate,
            json!({ "min_months": timeline.min, "max_months": timeline.max }),
        ),
        (
            AnalysisKind::FinancialImpact,
            json!({
                "expected_recovery": expected_recovery,
                "expected_cost": cost.midpoint(),
                "net_expected_value": expected_recovery - cost.midpoint(),
            }),
        ),
        (
            AnalysisKind::JudgeTrends,
            json!({
                "court": court,
                "favorability_score": prediction.judge_favorability_score,
                "trend": judge_trend,
                "confidence": Level::Low,
            }),
        ),
    ];

    entries
        .into_iter()
        .map(|(kind, mut data)| {
            if let Some(object) = data.as_object_mut() {
                object.insert("source".to_string(), json!("derived"));
            }
            AnalysisRecord::new(case_id, kind, data)
        })
        .collect()
}
