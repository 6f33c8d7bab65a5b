// file: src/pipeline/context.rs
// description: typed, progressively populated state threaded through one pipeline run
// reference: internal pipeline design

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{AnalysisRecord, CaseLawMatch, CaseRecord, OpinionText, PredictionRecord};
use crate::utils::FallbackSignals;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the context slots a step may require or produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    ExtractedContent,
    IntakeAnalysis,
    JurisdictionAnalysis,
    CaseEnhancement,
    CourtListenerCases,
    OpinionTexts,
    OpinionAnalysis,
    ComplexityScore,
    PredictionAnalysis,
    AdditionalAnalysis,
}

impl ContextKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKey::ExtractedContent => "extracted_content",
            ContextKey::IntakeAnalysis => "intake_analysis",
            ContextKey::JurisdictionAnalysis => "jurisdiction_analysis",
            ContextKey::CaseEnhancement => "case_enhancement",
            ContextKey::CourtListenerCases => "court_listener_cases",
            ContextKey::OpinionTexts => "opinion_texts",
            ContextKey::OpinionAnalysis => "opinion_analysis",
            ContextKey::ComplexityScore => "complexity_score",
            ContextKey::PredictionAnalysis => "prediction_analysis",
            ContextKey::AdditionalAnalysis => "additional_analysis",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text fused from every successfully extracted document of a case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub combined_text: String,
    pub document_count: usize,
    pub extracted_count: usize,
    pub total_pages: u32,
    pub failed_documents: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub case_id: String,
    pub case: CaseRecord,
    pub extracted_content: Option<ExtractedContent>,
    pub intake_analysis: Option<serde_json::Value>,
    pub jurisdiction_analysis: Option<serde_json::Value>,
    pub case_enhancement: Option<serde_json::Value>,
    pub court_listener_cases: Option<Vec<CaseLawMatch>>,
    pub opinion_texts: Option<Vec<OpinionText>>,
    pub opinion_analysis: Option<serde_json::Value>,
    pub complexity_score: Option<f64>,
    pub prediction_analysis: Option<PredictionRecord>,
    pub additional_analysis: Option<Vec<AnalysisRecord>>,
}

fn missing(key: ContextKey) -> PipelineError {
    PipelineError::MissingContext(key.as_str().to_string())
}

impl PipelineContext {
    pub fn new(case: CaseRecord) -> Self {
        Self {
            case_id: case.id.clone(),
            case,
            extracted_content: None,
            intake_analysis: None,
            jurisdiction_analysis: None,
            case_enhancement: None,
            court_listener_cases: None,
            opinion_texts: None,
            opinion_analysis: None,
            complexity_score: None,
            prediction_analysis: None,
            additional_analysis: None,
        }
    }

    pub fn has(&self, key: ContextKey) -> bool {
        match key {
            ContextKey::ExtractedContent => self.extracted_content.is_some(),
            ContextKey::IntakeAnalysis => self.intake_analysis.is_some(),
            ContextKey::JurisdictionAnalysis => self.jurisdiction_analysis.is_some(),
            ContextKey::CaseEnhancement => self.case_enhancement.is_some(),
            ContextKey::CourtListenerCases => self.court_listener_cases.is_some(),
            ContextKey::OpinionTexts => self.opinion_texts.is_some(),
            ContextKey::OpinionAnalysis => self.opinion_analysis.is_some(),
            ContextKey::ComplexityScore => self.complexity_score.is_some(),
            ContextKey::PredictionAnalysis => self.prediction_analysis.is_some(),
            ContextKey::AdditionalAnalysis => self.additional_analysis.is_some(),
        }
    }

    pub fn ensure(&self, keys: &[ContextKey]) -> Result<()> {
        match keys.iter().find(|key| !self.has(**key)) {
            Some(key) => Err(missing(*key)),
            None => Ok(()),
        }
    }

    pub fn require_extracted_content(&self) -> Result<&ExtractedContent> {
        self.extracted_content
            .as_ref()
            .ok_or_else(|| missing(ContextKey::ExtractedContent))
    }

    pub fn require_intake(&self) -> Result<&serde_json::Value> {
        self.intake_analysis
            .as_ref()
            .ok_or_else(|| missing(ContextKey::IntakeAnalysis))
    }

    pub fn require_jurisdiction(&self) -> Result<&serde_json::Value> {
        self.jurisdiction_analysis
            .as_ref()
            .ok_or_else(|| missing(ContextKey::JurisdictionAnalysis))
    }

    pub fn require_enhancement(&self) -> Result<&serde_json::Value> {
        self.case_enhancement
            .as_ref()
            .ok_or_else(|| missing(ContextKey::CaseEnhancement))
    }

    pub fn require_case_law(&self) -> Result<&[CaseLawMatch]> {
        self.court_listener_cases
            .as_deref()
            .ok_or_else(|| missing(ContextKey::CourtListenerCases))
    }

    pub fn require_opinion_texts(&self) -> Result<&[OpinionText]> {
        self.opinion_texts
            .as_deref()
            .ok_or_else(|| missing(ContextKey::OpinionTexts))
    }

    pub fn require_opinion_analysis(&self) -> Result<&serde_json::Value> {
        self.opinion_analysis
            .as_ref()
            .ok_or_else(|| missing(ContextKey::OpinionAnalysis))
    }

    pub fn require_complexity(&self) -> Result<f64> {
        self.complexity_score
            .ok_or_else(|| missing(ContextKey::ComplexityScore))
    }

    pub fn require_prediction(&self) -> Result<&PredictionRecord> {
        self.prediction_analysis
            .as_ref()
            .ok_or_else(|| missing(ContextKey::PredictionAnalysis))
    }

    pub fn require_additional(&self) -> Result<&[AnalysisRecord]> {
        self.additional_analysis
            .as_deref()
            .ok_or_else(|| missing(ContextKey::AdditionalAnalysis))
    }

    /// Signals available so far for synthesizing a fallback prediction.
    pub fn fallback_signals(&self, config: &PipelineConfig) -> FallbackSignals {
        FallbackSignals {
            complexity_score: self.complexity_score,
            case_law_matches: self.court_listener_cases.as_ref().map_or(0, Vec::len),
            document_count: self
                .extracted_content
                .as_ref()
                .map_or(0, |content| content.extracted_count),
            high_complexity_threshold: config.high_complexity_threshold,
            medium_complexity_threshold: config.medium_complexity_threshold,
        }
    }

    /// Case metadata sent along with every analysis request.
    pub fn case_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.case.id,
            "title": self.case.title,
            "case_type": self.case.case_type,
            "jurisdiction": self.case.jurisdiction,
            "court": self.case.court,
            "description": self.case.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    fn context() -> PipelineContext {
        PipelineContext::new(CaseRecord::new("case-1", "Acme v. Widget"))
    }

    #[test]
    fn test_missing_slot_is_reported_by_name() {
        let ctx = context();
        let err = ctx.require_intake().unwrap_err();
        assert!(matches!(err, PipelineError::MissingContext(ref key) if key == "intake_analysis"));
        assert!(ctx.ensure(&[]).is_ok());
        assert!(ctx.ensure(&[ContextKey::ComplexityScore]).is_err());
    }

    #[test]
    fn test_fallback_signals_follow_context() {
        let mut ctx = context();
        let config = PipelineConfig::default();
        assert_eq!(ctx.fallback_signals(&config).risk_level(), Level::Medium);

        ctx.complexity_score = Some(82.0);
        ctx.court_listener_cases = Some(Vec::new());
        ctx.extracted_content = Some(ExtractedContent {
            extracted_count: 2,
            document_count: 3,
            ..ExtractedContent::default()
        });

        let signals = ctx.fallback_signals(&config);
        assert_eq!(signals.risk_level(), Level::High);
        assert_eq!(signals.document_count, 2);
        assert_eq!(signals.case_law_matches, 0);
        assert!(ctx.has(ContextKey::CourtListenerCases));
    }
}
