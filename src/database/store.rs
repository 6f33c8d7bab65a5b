// file: src/database/store.rs
// description: keyed-upsert storage contracts for cases, stages, analyses, predictions and jobs
// reference: https://docs.rs/async-trait

use crate::error::Result;
use crate::models::{
    AnalysisKind, AnalysisRecord, CaseDocument, CaseRecord, CaseStatusUpdate, DocumentExtraction,
    EvidenceItem, Job, JobStatus, Party, PredictionRow, StageRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Durable store consumed by the pipeline. Every write is an upsert keyed by case id
/// plus a stage name, analysis type or document id.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>>;

    async fn put_case(&self, case: CaseRecord) -> Result<()>;

    async fn update_case_status(&self, case_id: &str, update: CaseStatusUpdate) -> Result<()>;

    async fn list_documents(&self, case_id: &str) -> Result<Vec<CaseDocument>>;

    async fn add_document(&self, document: CaseDocument) -> Result<()>;

    async fn upsert_extraction(&self, extraction: DocumentExtraction) -> Result<()>;

    async fn list_extractions(&self, case_id: &str) -> Result<Vec<DocumentExtraction>>;

    async fn list_parties(&self, case_id: &str) -> Result<Vec<Party>>;

    async fn put_parties(&self, case_id: &str, parties: Vec<Party>) -> Result<()>;

    async fn list_evidence(&self, case_id: &str) -> Result<Vec<EvidenceItem>>;

    async fn put_evidence(&self, case_id: &str, evidence: Vec<EvidenceItem>) -> Result<()>;

    async fn upsert_stage(&self, record: StageRecord) -> Result<()>;

    async fn list_stages(&self, case_id: &str) -> Result<Vec<StageRecord>>;

    async fn upsert_analysis(&self, record: AnalysisRecord) -> Result<()>;

    async fn get_analysis(
        &self,
        case_id: &str,
        kind: AnalysisKind,
    ) -> Result<Option<AnalysisRecord>>;

    async fn list_analyses(&self, case_id: &str) -> Result<Vec<AnalysisRecord>>;

    async fn upsert_prediction(&self, row: PredictionRow) -> Result<()>;

    async fn get_prediction(&self, case_id: &str) -> Result<Option<PredictionRow>>;
}

/// Mirror of the job queue. Advisory unless the queue rehydrates from it.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_job(&self, job: &Job) -> Result<()>;

    async fn load_jobs(&self, queue_name: Option<&str>) -> Result<Vec<Job>>;

    async fn job_counts(&self, queue_name: &str) -> Result<HashMap<JobStatus, usize>>;

    async fn purge_jobs(&self, queue_name: &str, statuses: &[JobStatus]) -> Result<usize>;
}

/// A case with everything needed to run the pipeline, as imported from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBundle {
    pub case: CaseRecord,
    #[serde(default)]
    pub documents: Vec<CaseDocument>,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

pub async fn import_bundle(store: &dyn CaseStore, bundle: CaseBundle) -> Result<String> {
    let case_id = bundle.case.id.clone();

    store.put_case(bundle.case).await?;
    for mut document in bundle.documents {
        document.case_id = case_id.clone();
        store.add_document(document).await?;
    }
    store.put_parties(&case_id, bundle.parties).await?;
    store.put_evidence(&case_id, bundle.evidence).await?;

    Ok(case_id)
}
