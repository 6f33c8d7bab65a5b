// file: src/services/case_law.rs
// description: CourtListener opinion search and opinion text retrieval
// reference: https://www.courtlistener.com/help/api/rest/

use crate::config::ServicesConfig;
use crate::error::{PipelineError, Result};
use crate::models::CaseLawMatch;
use crate::services::{CaseLawQuery, CaseLawSearch};
use crate::utils::Validator;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

const SERVICE: &str = "case-law";

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").expect("valid html tag regex");
    static ref WHITESPACE: Regex = Regex::new(r"[ \t]+").expect("valid whitespace regex");
}

pub struct CourtListenerClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl CourtListenerClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Validator::validate_url(&config.case_law_url)?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.case_law_url.trim_end_matches('/').to_string(),
            api_token: config.case_law_api_token.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.header("Authorization", format!("Token {}", token)),
            None => builder,
        }
    }

    async fn get_json(&self, builder: RequestBuilder) -> Result<Value> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| PipelineError::collaborator(SERVICE, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::collaborator(
                SERVICE,
                format!("status {}: {}", status, error_text),
            ));
        }

        response.json().await.map_err(|e| {
            PipelineError::collaborator(SERVICE, format!("invalid response body: {}", e))
        })
    }
}

#[async_trait]
impl CaseLawSearch for CourtListenerClient {
    async fn search(&self, query: &CaseLawQuery) -> Result<Vec<CaseLawMatch>> {
        let q = query.query_string();
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let mut params = vec![("q", q), ("type", "o".to_string())];
        if let Some(court) = &query.court {
            params.push(("court", court.clone()));
        }

        let url = format!("{}/search/", self.base_url);
        debug!("Searching case law with {:?}", params);

        let body = self.get_json(self.client.get(&url).query(&params)).await?;
        Ok(parse_search_results(&body, query.limit))
    }

    async fn fetch_opinion(&self, case_law_id: &str) -> Result<String> {
        let url = format!("{}/opinions/{}/", self.base_url, case_law_id);
        let body = self.get_json(self.client.get(&url)).await?;

        opinion_text(&body).ok_or_else(|| {
            PipelineError::collaborator(SERVICE, format!("opinion {} has no text", case_law_id))
        })
    }
}

/// Maps a search response to matches; relevance falls off with result rank. Each match is
/// keyed by its lead opinion id so `fetch_opinion` can request it directly. Hits that only
/// carry a cluster id are skipped.
pub fn parse_search_results(body: &Value, limit: usize) -> Vec<CaseLawMatch> {
    let Some(results) = body.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    let take = if limit == 0 { results.len() } else { limit.min(results.len()) };

    results
        .iter()
        .take(take)
        .enumerate()
        .filter_map(|(rank, item)| {
            let id = lead_opinion_id(item)?;

            Some(CaseLawMatch {
                id,
                case_name: string_field(item, "caseName").unwrap_or_default(),
                court: string_field(item, "court"),
                date_filed: string_field(item, "dateFiled"),
                citation: item
                    .get("citation")
                    .and_then(Value::as_array)
                    .and_then(|c| c.first())
                    .and_then(Value::as_str)
                    .map(str::to_string),
                snippet: string_field(item, "snippet")
                    .map(|s| strip_html(&s))
                    .unwrap_or_default(),
                relevance: 1.0 - rank as f64 / take as f64,
            })
        })
        .collect()
}

fn lead_opinion_id(item: &Value) -> Option<String> {
    item.get("opinions")
        .and_then(Value::as_array)
        .and_then(|opinions| opinions.iter().find_map(|opinion| opinion.get("id")))
        .or_else(|| item.get("id"))
        .and_then(id_string)
}

fn opinion_text(body: &Value) -> Option<String> {
    if let Some(text) = string_field(body, "plain_text").filter(|t| !t.trim().is_empty()) {
        return Some(text);
    }

    ["html_with_citations", "html", "html_lawbox"]
        .iter()
        .filter_map(|field| string_field(body, field))
        .find(|html| !html.trim().is_empty())
        .map(|html| strip_html(&html))
}

fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
