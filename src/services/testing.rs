// file: src/services/testing.rs
// description: in-process collaborators with scripted responses
// reference: internal test support

use crate::error::{PipelineError, Result};
use crate::models::{AnalysisKind, CaseDocument, CaseLawMatch};
use crate::services::{
    AnalysisRequest, AnalysisService, CaseLawQuery, CaseLawSearch, ExtractedText,
    PipelineServices, TextExtractor,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct StaticExtractor {
    pub failing_documents: HashSet<String>,
}

#[async_trait]
impl TextExtractor for StaticExtractor {
    async fn extract(&self, document: &CaseDocument) -> Result<ExtractedText> {
        if self.failing_documents.contains(&document.id) {
            return Err(PipelineError::collaborator("text-extraction", "unreadable file"));
        }
        Ok(ExtractedText {
            text: format!("Contents of {}", document.file_name),
            page_count: 2,
        })
    }
}

#[derive(Default)]
pub struct ScriptedAnalysis {
    pub failing: HashSet<AnalysisKind>,
    pub calls: Mutex<Vec<AnalysisKind>>,
}

impl ScriptedAnalysis {
    pub fn failing(kinds: &[AnalysisKind]) -> Self {
        Self {
            failing: kinds.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<AnalysisKind> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysis {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.kind);
        }
        if self.failing.contains(&request.kind) {
            return Err(PipelineError::collaborator("language-analysis", "quota exceeded"));
        }

        Ok(match request.kind {
            AnalysisKind::Intake => json!({
                "parties": [{"name": "Acme"}, {"name": "Widget"}],
                "legal_issues": ["breach of contract"],
            }),
            AnalysisKind::CaseEnhancement => json!({
                "search_terms": ["breach of contract"],
                "refined_search_terms": ["unjust enrichment"],
            }),
            AnalysisKind::Prediction => json!({
                "outcome_prediction_score": 72,
                "risk_level": "LOW",
                "confidence": "high",
                "estimated_cost": {"min": 20000, "max": 8000},
            }),
            kind => json!({"kind": kind.as_str()}),
        })
    }
}

#[derive(Default)]
pub struct StaticCaseLaw {
    pub fail_search: bool,
    pub failing_terms: HashSet<String>,
    pub failing_opinions: HashSet<String>,
}

#[async_trait]
impl CaseLawSearch for StaticCaseLaw {
    async fn search(&self, query: &CaseLawQuery) -> Result<Vec<CaseLawMatch>> {
        let refused = query.terms.iter().any(|term| self.failing_terms.contains(term));
        if self.fail_search || refused {
            return Err(PipelineError::collaborator("case-law", "service unavailable"));
        }
        Ok((1..=query.limit.min(2))
            .map(|n| CaseLawMatch {
                id: n.to_string(),
                case_name: format!("Precedent {}", n),
                court: query.court.clone(),
                date_filed: None,
                citation: None,
                snippet: String::new(),
                relevance: 1.0 / n as f64,
            })
            .collect())
    }

    async fn fetch_opinion(&self, case_law_id: &str) -> Result<String> {
        if self.failing_opinions.contains(case_law_id) {
            return Err(PipelineError::collaborator("case-law", "opinion not found"));
        }
        Ok(format!("Opinion text for {}", case_law_id))
    }
}

pub fn services(
    extractor: StaticExtractor,
    analysis: Arc<ScriptedAnalysis>,
    case_law: StaticCaseLaw,
) -> PipelineServices {
    PipelineServices::new(Arc::new(extractor), analysis, Arc::new(case_law))
}
