// file: src/pipeline/steps/documents.rs
// description: per-document text extraction fused into one content block
// reference: orchestrates asynchronous ingestion workflow

use crate::error::Result;
use crate::models::DocumentExtraction;
use crate::pipeline::context::{ContextKey, ExtractedContent, PipelineContext};
use crate::pipeline::step::{PipelineStep, StepResources};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use tracing::{info, warn};

const MAX_CONCURRENT_EXTRACTIONS: usize = 4;

pub struct DocumentExtractionStep;

#[async_trait]
impl PipelineStep for DocumentExtractionStep {
    fn name(&self) -> &'static str {
        "document_extraction"
    }

    fn produces(&self) -> &'static [ContextKey] {
        &[ContextKey::ExtractedContent]
    }

    async fn run(&self, ctx: &mut PipelineContext, resources: &StepResources) -> Result<Value> {
        let documents = resources.store.list_documents(&ctx.case_id).await?;
        let extractor = resources.services.extractor.clone();

        let extractions: Vec<(String, DocumentExtraction)> = stream::iter(documents)
            .map(|document| {
                let extractor = extractor.clone();
                async move {
                    let extraction = match extractor.extract(&document).await {
                        Ok(extracted) => DocumentExtraction::succeeded(
                            &document,
                            extracted.text,
                            extracted.page_count,
                        ),
                        Err(e) => {
                            warn!("Extraction failed for {}: {}", document.file_name, e);
                            DocumentExtraction::failed(&document, e.to_string())
                        }
                    };
                    (document.file_name, extraction)
                }
            })
            .buffered(MAX_CONCURRENT_EXTRACTIONS)
            .collect()
            .await;

        let mut content = ExtractedContent {
            document_count: extractions.len(),
            ..ExtractedContent::default()
        };
        let mut sections = Vec::new();

        for (file_name, extraction) in extractions {
            if extraction.is_success() {
                content.extracted_count += 1;
                content.total_pages += extraction.page_count;
                if !extraction.text.trim().is_empty() {
                    sections.push(format!("--- {} ---\n{}", file_name, extraction.text.trim()));
                }
            } else {
                content.failed_documents.push(file_name);
            }
            resources.store.upsert_extraction(extraction).await?;
        }

        content.combined_text = if sections.is_empty() {
            ctx.case.description.clone()
        } else {
            sections.join("\n\n")
        };

        info!(
            "Extracted {}/{} documents ({} pages) for case {}",
            content.extracted_count, content.document_count, content.total_pages, ctx.case_id
        );

        let summary = json!({
            "documents": content.document_count,
            "extracted": content.extracted_count,
            "pages": content.total_pages,
            "failed": content.failed_documents,
            "characters": content.combined_text.chars().count(),
        });
        ctx.extracted_content = Some(content);
        Ok(summary)
    }
}
