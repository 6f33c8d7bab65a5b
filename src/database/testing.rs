// file: src/database/testing.rs
// description: store wrapper whose writes can be made to fail, for exercising error paths
// reference: internal test support

use crate::database::memory::MemoryStore;
use crate::database::store::{CaseStore, JobStore};
use crate::error::{PipelineError, Result};
use crate::models::{
    AnalysisKind, AnalysisRecord, CaseDocument, CaseRecord, CaseStatusUpdate, DocumentExtraction,
    EvidenceItem, Job, JobStatus, Party, PredictionRow, StageRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn failing_writes() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PipelineError::Persistence("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CaseStore for FlakyStore {
    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>> {
        self.inner.get_case(case_id).await
    }

    async fn put_case(&self, case: CaseRecord) -> Result<()> {
        self.check()?;
        self.inner.put_case(case).await
    }

    async fn update_case_status(&self, case_id: &str, update: CaseStatusUpdate) -> Result<()> {
        self.check()?;
        self.inner.update_case_status(case_id, update).await
    }

    async fn list_documents(&self, case_id: &str) -> Result<Vec<CaseDocument>> {
        self.inner.list_documents(case_id).await
    }

    async fn add_document(&self, document: CaseDocument) -> Result<()> {
        self.check()?;
        self.inner.add_document(document).await
    }

    async fn upsert_extraction(&self, extraction: DocumentExtraction) -> Result<()> {
        self.check()?;
        self.inner.upsert_extraction(extraction).await
    }

    async fn list_extractions(&self, case_id: &str) -> Result<Vec<DocumentExtraction>> {
        self.inner.list_extractions(case_id).await
    }

    async fn list_parties(&self, case_id: &str) -> Result<Vec<Party>> {
        self.inner.list_parties(case_id).await
    }

    async fn put_parties(&self, case_id: &str, parties: Vec<Party>) -> Result<()> {
        self.check()?;
        self.inner.put_parties(case_id, parties).await
    }

    async fn list_evidence(&self, case_id: &str) -> Result<Vec<EvidenceItem>> {
        self.inner.list_evidence(case_id).await
    }

    async fn put_evidence(&self, case_id: &str, evidence: Vec<EvidenceItem>) -> Result<()> {
        self.check()?;
        self.inner.put_evidence(case_id, evidence).await
    }

    async fn upsert_stage(&self, record: StageRecord) -> Result<()> {
        self.check()?;
        self.inner.upsert_stage(record).await
    }

    async fn list_stages(&self, case_id: &str) -> Result<Vec<StageRecord>> {
        self.inner.list_stages(case_id).await
    }

    async fn upsert_analysis(&self, record: AnalysisRecord) -> Result<()> {
        self.check()?;
        self.inner.upsert_analysis(record).await
    }

    async fn get_analysis(
        &self,
        case_id: &str,
        kind: AnalysisKind,
    ) -> Result<Option<AnalysisRecord>> {
        self.inner.get_analysis(case_id, kind).await
    }

    async fn list_analyses(&self, case_id: &str) -> Result<Vec<AnalysisRecord>> {
        self.inner.list_analyses(case_id).await
    }

    async fn upsert_prediction(&self, row: PredictionRow) -> Result<()> {
        self.check()?;
        self.inner.upsert_prediction(row).await
    }

    async fn get_prediction(&self, case_id: &str) -> Result<Option<PredictionRow>> {
        self.inner.get_prediction(case_id).await
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn save_job(&self, job: &Job) -> Result<()> {
        self.check()?;
        self.inner.save_job(job).await
    }

    async fn load_jobs(&self, queue_name: Option<&str>) -> Result<Vec<Job>> {
        self.inner.load_jobs(queue_name).await
    }

    async fn job_counts(&self, queue_name: &str) -> Result<HashMap<JobStatus, usize>> {
        self.inner.job_counts(queue_name).await
    }

    async fn purge_jobs(&self, queue_name: &str, statuses: &[JobStatus]) -> Result<usize> {
        self.check()?;
        self.inner.purge_jobs(queue_name, statuses).await
    }
}
