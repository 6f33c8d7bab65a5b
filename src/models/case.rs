// file: src/models/case.rs
// description: case records, uploaded documents and per-document extraction results
// reference: core data structures read and written by the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Idle => "idle",
            ProcessingStatus::Queued => "queued",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ProcessingStatus::Queued | ProcessingStatus::Processing)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub case_type: String,
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub ai_processed: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CaseRecord {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            case_type: String::new(),
            jurisdiction: String::new(),
            court: None,
            description: String::new(),
            processing_status: ProcessingStatus::Idle,
            ai_processed: false,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: CaseStatusUpdate) {
        self.processing_status = update.status;
        if let Some(ai_processed) = update.ai_processed {
            self.ai_processed = ai_processed;
        }
        self.error_message = update.error_message;
        self.updated_at = Utc::now();
    }
}

/// Status change applied to a case by the orchestrator and triggers.
#[derive(Debug, Clone)]
pub struct CaseStatusUpdate {
    pub status: ProcessingStatus,
    pub ai_processed: Option<bool>,
    pub error_message: Option<String>,
}

impl CaseStatusUpdate {
    pub fn status(status: ProcessingStatus) -> Self {
        Self {
            status,
            ai_processed: None,
            error_message: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: ProcessingStatus::Completed,
            ai_processed: Some(true),
            error_message: None,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            ai_processed: None,
            error_message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDocument {
    pub id: String,
    pub case_id: String,
    pub file_name: String,
    /// File path or URL handed to the text-extraction service.
    pub location: String,
    #[serde(default = "Utc::now")]
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub document_id: String,
    pub case_id: String,
    pub text: String,
    pub page_count: u32,
    pub content_hash: String,
    pub error: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl DocumentExtraction {
    pub fn succeeded(document: &CaseDocument, text: String, page_count: u32) -> Self {
        let content_hash = Self::compute_hash(&text);
        Self {
            document_id: document.id.clone(),
            case_id: document.case_id.clone(),
            text,
            page_count,
            content_hash,
            error: None,
            extracted_at: Utc::now(),
        }
    }

    pub fn failed(document: &CaseDocument, error: String) -> Self {
        Self {
            document_id: document.id.clone(),
            case_id: document.case_id.clone(),
            text: String::new(),
            page_count: 0,
            content_hash: String::new(),
            error: Some(error),
            extracted_at: Utc::now(),
        }
    }

    fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub counsel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub description: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub strength: Option<f64>,
}
