// file: src/services/mod.rs
// description: contracts for the external collaborators the pipeline calls
// reference: internal module structure

pub mod analysis;
pub mod case_law;
pub mod extraction;
#[cfg(test)]
pub(crate) mod testing;

use crate::config::ServicesConfig;
use crate::error::Result;
use crate::models::{AnalysisKind, CaseDocument, CaseLawMatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use analysis::HttpAnalysisClient;
pub use case_law::CourtListenerClient;
pub use extraction::HttpTextExtractor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    #[serde(default)]
    pub page_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub kind: AnalysisKind,
    pub case_id: String,
    pub context: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseLawQuery {
    pub terms: Vec<String>,
    pub court: Option<String>,
    pub limit: usize,
}

impl CaseLawQuery {
    pub fn query_string(&self) -> String {
        self.terms
            .iter()
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .map(|term| {
                if term.contains(' ') {
                    format!("\"{}\"", term)
                } else {
                    term.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &CaseDocument) -> Result<ExtractedText>;
}

/// Language-analysis service. Payloads are arbitrary JSON; callers validate them.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value>;
}

#[async_trait]
pub trait CaseLawSearch: Send + Sync {
    async fn search(&self, query: &CaseLawQuery) -> Result<Vec<CaseLawMatch>>;

    async fn fetch_opinion(&self, case_law_id: &str) -> Result<String>;
}

/// The collaborators one orchestrator talks to.
#[derive(Clone)]
pub struct PipelineServices {
    pub extractor: Arc<dyn TextExtractor>,
    pub analysis: Arc<dyn AnalysisService>,
    pub case_law: Arc<dyn CaseLawSearch>,
}

impl PipelineServices {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        analysis: Arc<dyn AnalysisService>,
        case_law: Arc<dyn CaseLawSearch>,
    ) -> Self {
        Self {
            extractor,
            analysis,
            case_law,
        }
    }

    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            extractor: Arc::new(HttpTextExtractor::new(config)?),
            analysis: Arc::new(HttpAnalysisClient::new(config)?),
            case_law: Arc::new(CourtListenerClient::new(config)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_quotes_phrases() {
        let query = CaseLawQuery {
            terms: vec![
                "breach of contract".to_string(),
                " ".to_string(),
                "negligence".to_string(),
            ],
            court: None,
            limit: 5,
        };
        assert_eq!(query.query_string(), "\"breach of contract\" negligence");
    }
}
