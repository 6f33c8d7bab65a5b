// file: src/services/extraction.rs
// description: HTTP client for the document-text-extraction service
// reference: https://docs.rs/reqwest

use crate::config::ServicesConfig;
use crate::error::{PipelineError, Result};
use crate::models::CaseDocument;
use crate::services::{ExtractedText, TextExtractor};
use crate::utils::Validator;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

const SERVICE: &str = "text-extraction";

#[derive(Debug, Serialize)]
struct ExtractionRequest<'a> {
    document_id: &'a str,
    file_name: &'a str,
    location: &'a str,
}

pub struct HttpTextExtractor {
    client: Client,
    base_url: String,
}

impl HttpTextExtractor {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Validator::validate_url(&config.extraction_url)?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.extraction_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, document: &CaseDocument) -> Result<ExtractedText> {
        let url = format!("{}/extract", self.base_url);
        let request = ExtractionRequest {
            document_id: &document.id,
            file_name: &document.file_name,
            location: &document.location,
        };

        debug!("Requesting text extraction for {}", document.file_name);

        let response = self
            .client
            .post(&url)
            .json(&request)
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

        let extracted: ExtractedText = response.json().await.map_err(|e| {
            PipelineError::collaborator(SERVICE, format!("invalid response body: {}", e))
        })?;

        debug!(
            "Extracted {} chars across {} pages from {}",
            extracted.text.len(),
            extracted.page_count,
            document.file_name
        );
        Ok(extracted)
    }
}
