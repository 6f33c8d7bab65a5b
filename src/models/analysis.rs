// file: src/models/analysis.rs
// description: analysis results keyed by (case, analysis type) and case-law candidates
// reference: arbitrary JSON snapshots persisted per analysis type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Intake,
    Jurisdiction,
    CaseEnhancement,
    OpinionAnalysis,
    Prediction,
    CostEstimate,
    RiskAssessment,
    SettlementAnalysis,
    TimelineEstimate,
    FinancialImpact,
    JudgeTrends,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Intake => "intake",
            AnalysisKind::Jurisdiction => "jurisdiction",
            AnalysisKind::CaseEnhancement => "case_enhancement",
            AnalysisKind::OpinionAnalysis => "opinion_analysis",
            AnalysisKind::Prediction => "prediction",
            AnalysisKind::CostEstimate => "cost_estimate",
            AnalysisKind::RiskAssessment => "risk_assessment",
            AnalysisKind::SettlementAnalysis => "settlement_analysis",
            AnalysisKind::TimelineEstimate => "timeline_estimate",
            AnalysisKind::FinancialImpact => "financial_impact",
            AnalysisKind::JudgeTrends => "judge_trends",
        }
    }

    /// Analyses requested after the prediction, one per kind.
    pub const AUXILIARY: [AnalysisKind; 6] = [
        AnalysisKind::CostEstimate,
        AnalysisKind::RiskAssessment,
        AnalysisKind::SettlementAnalysis,
        AnalysisKind::TimelineEstimate,
        AnalysisKind::FinancialImpact,
        AnalysisKind::JudgeTrends,
    ];
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub case_id: String,
    pub analysis_type: AnalysisKind,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(case_id: &str, analysis_type: AnalysisKind, data: Value) -> Self {
        Self {
            case_id: case_id.to_string(),
            analysis_type,
            data,
            updated_at: Utc::now(),
        }
    }
}

/// A candidate opinion returned by the case-law search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseLawMatch {
    pub id: String,
    pub case_name: String,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub date_filed: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionText {
    pub case_law_id: String,
    pub text: String,
}
