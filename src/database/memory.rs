// file: src/database/memory.rs
// description: in-process implementation of the case and job stores
// reference: keyed maps behind a tokio RwLock

use crate::database::store::{CaseStore, JobStore};
use crate::error::{PipelineError, Result};
use crate::models::{
    AnalysisKind, AnalysisRecord, CaseDocument, CaseRecord, CaseStatusUpdate, DocumentExtraction,
    EvidenceItem, Job, JobStatus, Party, PredictionRow, StageRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Rows keyed the same way as the durable tables: case id, then stage name, analysis
/// type or document id.
#[derive(Debug, Default)]
struct StoreState {
    cases: HashMap<String, CaseRecord>,
    documents: HashMap<String, Vec<CaseDocument>>,
    extractions: HashMap<String, HashMap<String, DocumentExtraction>>,
    parties: HashMap<String, Vec<Party>>,
    evidence: HashMap<String, Vec<EvidenceItem>>,
    stages: HashMap<String, HashMap<String, StageRecord>>,
    analyses: HashMap<String, HashMap<String, AnalysisRecord>>,
    predictions: HashMap<String, PredictionRow>,
    jobs: HashMap<String, Job>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>> {
        Ok(self.state.read().await.cases.get(case_id).cloned())
    }

    async fn put_case(&self, case: CaseRecord) -> Result<()> {
        self.state.write().await.cases.insert(case.id.clone(), case);
        Ok(())
    }

    async fn update_case_status(&self, case_id: &str, update: CaseStatusUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        let case = state
            .cases
            .get_mut(case_id)
            .ok_or_else(|| PipelineError::NotFound(format!("case {}", case_id)))?;

        case.apply(update);
        Ok(())
    }

    async fn list_documents(&self, case_id: &str) -> Result<Vec<CaseDocument>> {
        Ok(self
            .state
            .read()
            .await
            .documents
            .get(case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_document(&self, document: CaseDocument) -> Result<()> {
        let mut state = self.state.write().await;
        let documents = state.documents.entry(document.case_id.clone()).or_default();
        documents.retain(|existing| existing.id != document.id);
        documents.push(document);
        Ok(())
    }

    async fn upsert_extraction(&self, extraction: DocumentExtraction) -> Result<()> {
        self.state
            .write()
            .await
            .extractions
            .entry(extraction.case_id.clone())
            .or_default()
            .insert(extraction.document_id.clone(), extraction);
        Ok(())
    }

    async fn list_extractions(&self, case_id: &str) -> Result<Vec<DocumentExtraction>> {
        let state = self.state.read().await;
        let mut extractions: Vec<DocumentExtraction> = state
            .extractions
            .get(case_id)
            .map(|by_doc| by_doc.values().cloned().collect())
            .unwrap_or_default();
        extractions.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(extractions)
    }

    async fn list_parties(&self, case_id: &str) -> Result<Vec<Party>> {
        Ok(self
            .state
            .read()
            .await
            .parties
            .get(case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_parties(&self, case_id: &str, parties: Vec<Party>) -> Result<()> {
        self.state
            .write()
            .await
            .parties
            .insert(case_id.to_string(), parties);
        Ok(())
    }

    async fn list_evidence(&self, case_id: &str) -> Result<Vec<EvidenceItem>> {
        Ok(self
            .state
            .read()
            .await
            .evidence
            .get(case_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_evidence(&self, case_id: &str, evidence: Vec<EvidenceItem>) -> Result<()> {
        self.state
            .write()
            .await
            .evidence
            .insert(case_id.to_string(), evidence);
        Ok(())
    }

    async fn upsert_stage(&self, record: StageRecord) -> Result<()> {
        self.state
            .write()
            .await
            .stages
            .entry(record.case_id.clone())
            .or_default()
            .insert(record.stage_name.clone(), record);
        Ok(())
    }

    async fn list_stages(&self, case_id: &str) -> Result<Vec<StageRecord>> {
        let state = self.state.read().await;
        let mut stages: Vec<StageRecord> = state
            .stages
            .get(case_id)
            .map(|by_name| by_name.values().cloned().collect())
            .unwrap_or_default();
        stages.sort_by_key(|record| record.started_at);
        Ok(stages)
    }

    async fn upsert_analysis(&self, record: AnalysisRecord) -> Result<()> {
        self.state
            .write()
            .await
            .analyses
            .entry(record.case_id.clone())
            .or_default()
            .insert(record.analysis_type.as_str().to_string(), record);
        Ok(())
    }

    async fn get_analysis(
        &self,
        case_id: &str,
        kind: AnalysisKind,
    ) -> Result<Option<AnalysisRecord>> {
        Ok(self
            .state
            .read()
            .await
            .analyses
            .get(case_id)
            .and_then(|by_kind| by_kind.get(kind.as_str()))
            .cloned())
    }

    async fn list_analyses(&self, case_id: &str) -> Result<Vec<AnalysisRecord>> {
        let state = self.state.read().await;
        let mut analyses: Vec<AnalysisRecord> = state
            .analyses
            .get(case_id)
            .map(|by_kind| by_kind.values().cloned().collect())
            .unwrap_or_default();
        analyses.sort_by(|a, b| a.analysis_type.as_str().cmp(b.analysis_type.as_str()));
        Ok(analyses)
    }

    async fn upsert_prediction(&self, row: PredictionRow) -> Result<()> {
        self.state
            .write()
            .await
            .predictions
            .insert(row.case_id.clone(), row);
        Ok(())
    }

    async fn get_prediction(&self, case_id: &str) -> Result<Option<PredictionRow>> {
        Ok(self.state.read().await.predictions.get(case_id).cloned())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save_job(&self, job: &Job) -> Result<()> {
        self.state
            .write()
            .await
            .jobs
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn load_jobs(&self, queue_name: Option<&str>) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| queue_name.is_none_or(|name| job.queue_name == name))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(jobs)
    }

    async fn job_counts(&self, queue_name: &str) -> Result<HashMap<JobStatus, usize>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for job in state.jobs.values().filter(|job| job.queue_name == queue_name) {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn purge_jobs(&self, queue_name: &str, statuses: &[JobStatus]) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, job| job.queue_name != queue_name || !statuses.contains(&job.status));
        Ok(before - state.jobs.len())
    }
}
