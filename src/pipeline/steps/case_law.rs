// file: src/pipeline/steps/case_law.rs
// description: case-law search, refinement of the candidate list and concurrent opinion retrieval
// reference: https://www.courtlistener.com/help/api/rest/

use crate::error::Result;
use crate::models::{CaseLawMatch, OpinionText};
use crate::pipeline::context::{ContextKey, PipelineContext};
use crate::pipeline::step::{PipelineStep, StepResources};
use crate::services::CaseLawQuery;
use crate::utils::Validator;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Search terms suggested by the enhancement, else the intake's legal issues, else case metadata.
pub fn search_terms(ctx: &PipelineContext, enhancement: &Value) -> Vec<String> {
    let suggested = Validator::validate_string_list(&enhancement["search_terms"]);
    if !suggested.is_empty() {
        return suggested;
    }

    if let Some(intake) = &ctx.intake_analysis {
        let issues = Validator::validate_string_list(&intake["legal_issues"]);
        if !issues.is_empty() {
            return issues;
        }
    }

    [ctx.case.case_type.trim(), ctx.case.title.trim()]
        .into_iter()
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn search_case_law(
    resources: &StepResources,
    terms: Vec<String>,
    court: Option<String>,
) -> Result<Vec<CaseLawMatch>> {
    if terms.is_empty() {
        debug!("No search terms available, skipping case-law search");
        return Ok(Vec::new());
    }

    let query = CaseLawQuery {
        terms,
        court,
        limit: resources.config.max_case_law_matches,
    };
    resources.services.case_law.search(&query).await
}

/// Merges candidate lists by id, keeping the highest relevance, ordered best first.
pub fn merge_matches(lists: Vec<Vec<CaseLawMatch>>, limit: usize) -> Vec<CaseLawMatch> {
    let mut by_id: HashMap<String, CaseLawMatch> = HashMap::new();

    for candidate in lists.into_iter().flatten() {
        if candidate.case_name.trim().is_empty() {
            continue;
        }
        match by_id.get(&candidate.id) {
            Some(existing) if existing.relevance >= candidate.relevance => {}
            _ => {
                by_id.insert(candidate.id.clone(), candidate);
            }
        }
    }

    let mut merged: Vec<CaseLawMatch> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(limit);
    merged
}

pub struct CaseLawRefinementStep;

#[async_trait]
impl PipelineStep for CaseLawRefinementStep {
    fn name(&self) -> &'static str {
        "case_law_refinement"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::CaseEnhancement, ContextKey::CourtListenerCases]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::CourtListenerCases]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let limit = resources.config.max_case_law_matches;
        let enhancement = ctx.require_enhancement()?;
        let initial = ctx.require_case_law()?.to_vec();
        let before = initial.len();

        let refined_terms = Validator::validate_string_list(&enhancement["refined_search_terms"]);
        let mut lists = vec![initial];
        let refined_search = before < limit && !refined_terms.is_empty();

        if refined_search {
            let court = ctx.case.court.clone();
            lists.push(search_case_law(resources, refined_terms, court).await?);
        }

        let refined = merge_matches(lists, limit);
        let summary = json!({
            "before": before,
            "after": refined.len(),
            "refined_search": refined_search,
        });

        ctx.court_listener_cases = Some(refined);
        Ok(summary)
    }
}

/// Fetches the opinion text of every candidate concurrently. Individual failures are
/// skipped; the step fails only when every fetch failed.
pub struct OpinionFetchStep;

#[async_trait]
impl PipelineStep for OpinionFetchStep {
    fn name(&self) -> &'static str {
        "opinion_fetch"
    }

    fn requires(&self) -> &'static [ContextKey] {
        &[ContextKey::CourtListenerCases]
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::OpinionTexts]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let cases = ctx.require_case_law()?;
        let search = resources.services.case_law.clone();

        let fetches = cases.iter().map(|case| {
            let search = search.clone();
            async move {
                let text = search.fetch_opinion(&case.id).await;
                (case.id.clone(), text)
            }
        });
        let results = join_all(fetches).await;
        let requested = results.len();

        let mut opinions = Vec::new();
        let mut first_error = None;
        for (case_law_id, result) in results {
            match result {
                Ok(text) => opinions.push(OpinionText { case_law_id, text }),
                Err(e) => {
                    warn!("Failed to fetch opinion {}: {}", case_law_id, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if opinions.is_empty()
            && let Some(error) = first_error
        {
            return Err(error);
        }

        let summary = json!({
            "requested": requested,
            "fetched": opinions.len(),
        });
        ctx.opinion_texts = Some(opinions);
        Ok(summary)
    }
}
