// file: src/services/analysis.rs
// description: HTTP client for the language-analysis service with a wall-clock timeout race
// reference: https://docs.rs/reqwest

use crate::config::ServicesConfig;
use crate::error::{PipelineError, Result};
use crate::services::{AnalysisRequest, AnalysisService};
use crate::utils::Validator;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "language-analysis";

lazy_static! {
    static ref FENCED_JSON: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\}|\[.*?\])\s*```").expect("valid fenced json regex");
}

pub struct HttpAnalysisClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpAnalysisClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Validator::validate_url(&config.analysis_url)?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.analysis_url.trim_end_matches('/').to_string(),
            api_key: config.analysis_api_key.clone(),
            timeout: Duration::from_secs(config.analysis_timeout_secs),
        })
    }

    async fn send(&self, request: &AnalysisRequest) -> Result<Value> {
        let url = format!("{}/analyze", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::collaborator(SERVICE, format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PipelineError::collaborator(SERVICE, "rate limited (quota exceeded)"));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::collaborator(
                SERVICE,
                format!("status {}: {}", status, error_text),
            ));
        }

        let body = response.text().await.map_err(|e| {
            PipelineError::collaborator(SERVICE, format!("failed to read response: {}", e))
        })?;

        Ok(parse_analysis_payload(&body))
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value> {
        debug!(
            "Requesting {} analysis for case {}",
            request.kind, request.case_id
        );

        match tokio::time::timeout(self.timeout, self.send(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} analysis for case {} exceeded {}s",
                    request.kind,
                    request.case_id,
                    self.timeout.as_secs()
                );
                Err(PipelineError::Timeout {
                    operation: format!("{} analysis", request.kind),
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

/// Turns a service response body into JSON. Chat-style envelopes and fenced code
/// blocks are unwrapped; free text is kept under `summary`.
pub fn parse_analysis_payload(body: &str) -> Value {
    let trimmed = body.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match envelope_text(&value) {
            Some(text) => parse_analysis_payload(text),
            None => value,
        };
    }

    if let Some(captures) = FENCED_JSON.captures(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(&captures[1])
    {
        return value;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
    {
        return value;
    }

    json!({ "summary": trimmed })
}

fn envelope_text(value: &Value) -> Option<&str> {
    if let Some(content) = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Some(content);
    }
    match value {
        Value::String(text) => Some(text.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_json() {
        let value = parse_analysis_payload(r#"{"risk_level": "high"}"#);
        assert_eq!(value["risk_level"], "high");
    }

    #[test]
    fn test_unwraps_fenced_block() {
        let body = "Here is the analysis:\n```json\n{\"outcome_prediction_score\": 64}\n```\nThanks";
        let value = parse_analysis_payload(body);
        assert_eq!(value["outcome_prediction_score"], 64);
    }

    #[test]
    fn test_unwraps_chat_envelope() {
        let body = r#"{"choices":[{"message":{"content":"```json\n{\"confidence\":\"low\"}\n```"}}]}"#;
        let value = parse_analysis_payload(body);
        assert_eq!(value["confidence"], "low");
    }

    #[test]
    fn test_free_text_becomes_summary() {
        let value = parse_analysis_payload("The claim appears strong.");
        assert_eq!(value["summary"], "The claim appears strong.");
    }

    #[test]
    fn test_embedded_object_is_extracted() {
        let value = parse_analysis_payload("Result: {\"jurisdiction\": \"federal\"} end");
        assert_eq!(value["jurisdiction"], "federal");
    }
}
