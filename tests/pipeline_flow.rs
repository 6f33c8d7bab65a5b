// file: tests/pipeline_flow.rs
// description: end-to-end pipeline runs against in-memory collaborators
// reference: integration tests through the public api

use async_trait::async_trait;
use case_pipeline::models::CaseLawMatch;
use case_pipeline::pipeline::STAGE_NAMES;
use case_pipeline::services::{AnalysisRequest, CaseLawQuery, ExtractedText};
use case_pipeline::{
    AnalysisKind, AnalysisService, CaseDocument, CaseLawSearch, CaseRecord, CaseStore, CaseTrigger,
    JobQueue, JobStatus, MemoryStore, PipelineConfig, PipelineError, PipelineJobHandler,
    PipelineOrchestrator, PipelineServices, PredictionSource, ProcessingStatus, QueueConfig,
    StageStatus, TextExtractor,
};
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Extractor;

#[async_trait]
impl TextExtractor for Extractor {
    async fn extract(&self, document: &CaseDocument) -> case_pipeline::Result<ExtractedText> {
        Ok(ExtractedText {
            text: format!("The plaintiff alleges breach in {}", document.file_name),
            page_count: 3,
        })
    }
}

#[derive(Default)]
struct Analysis {
    fail_prediction: bool,
    calls: Mutex<Vec<AnalysisKind>>,
}

impl Analysis {
    fn failing_prediction() -> Self {
        Self {
            fail_prediction: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<AnalysisKind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for Analysis {
    async fn analyze(&self, request: AnalysisRequest) -> case_pipeline::Result<Value> {
        self.calls.lock().unwrap().push(request.kind);
        match request.kind {
            AnalysisKind::Prediction if self.fail_prediction => Err(PipelineError::Collaborator {
                service: "language-analysis".to_string(),
                message: "malformed response".to_string(),
            }),
            AnalysisKind::Prediction => Ok(json!({
                "outcome_prediction_score": 64,
                "settlement_probability": 40,
                "risk_level": "medium",
                "confidence": "MEDIUM",
            })),
            AnalysisKind::Intake => Ok(json!({
                "parties": [{"name": "Acme Corp"}, {"name": "Widget LLC"}],
                "legal_issues": ["breach of contract", "unjust enrichment"],
            })),
            AnalysisKind::CaseEnhancement => Ok(json!({"search_terms": ["breach of contract"]})),
            kind => Ok(json!({"kind": kind.as_str(), "summary": "ok"})),
        }
    }
}

#[derive(Default)]
struct CaseLaw {
    fail_search: bool,
    searches: AtomicUsize,
}

#[async_trait]
impl CaseLawSearch for CaseLaw {
    async fn search(&self, query: &CaseLawQuery) -> case_pipeline::Result<Vec<CaseLawMatch>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(PipelineError::Collaborator {
                service: "case-law".to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        Ok(vec![CaseLawMatch {
            id: "4242".to_string(),
            case_name: "Smith v. Jones".to_string(),
            court: query.court.clone(),
            date_filed: Some("2019-04-01".to_string()),
            citation: None,
            snippet: "breach of contract".to_string(),
            relevance: 0.9,
        }])
    }

    async fn fetch_opinion(&self, case_law_id: &str) -> case_pipeline::Result<String> {
        Ok(format!("Opinion {} held for the plaintiff.", case_law_id))
    }
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let mut case = CaseRecord::new("case-7", "Acme Corp v. Widget LLC");
    case.case_type = "contract".to_string();
    case.jurisdiction = "CA".to_string();
    store.put_case(case).await.unwrap();
    store
        .add_document(CaseDocument {
            id: "doc-1".to_string(),
            case_id: "case-7".to_string(),
            file_name: "complaint.pdf".to_string(),
            location: "/uploads/complaint.pdf".to_string(),
            uploaded_at: Utc::now(),
        })
        .await
        .unwrap();
    store
}

fn orchestrator(
    store: Arc<MemoryStore>,
    analysis: Arc<Analysis>,
    case_law: Arc<CaseLaw>,
) -> PipelineOrchestrator {
    let services = PipelineServices::new(Arc::new(Extractor), analysis, case_law);
    PipelineOrchestrator::new(store, services, PipelineConfig::default()).unwrap()
}

#[tokio::test]
async fn case_law_failure_stops_the_run() {
    let store = seeded_store().await;
    let case_law = Arc::new(CaseLaw {
        fail_search: true,
        ..CaseLaw::default()
    });
    let orchestrator = orchestrator(store.clone(), Arc::new(Analysis::default()), case_law.clone());

    let err = orchestrator.run_pipeline("case-7").await.unwrap_err();
    match err {
        PipelineError::StepAborted {
            step_name,
            step_index,
            ..
        } => {
            assert_eq!(step_name, "case_enhancement");
            assert_eq!(step_index, 5);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(case_law.searches.load(Ordering::SeqCst), 1);

    let case = store.get_case("case-7").await.unwrap().unwrap();
    assert_eq!(case.processing_status, ProcessingStatus::Failed);
    assert!(!case.ai_processed);
    assert!(case.error_message.unwrap().contains("case_enhancement (step 5)"));

    let stages = store.list_stages("case-7").await.unwrap();
    assert!(stages.iter().all(|s| s.stage_name != "opinion_fetch"));
    let failed = stages
        .iter()
        .find(|s| s.stage_name == "case_enhancement")
        .unwrap();
    assert_eq!(failed.status, StageStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("503"));

    assert!(store.get_prediction("case-7").await.unwrap().is_none());

    let progress = orchestrator.tracker().get_progress("case-7").await.unwrap();
    assert_eq!(progress.percentage, 28.6);
    assert_eq!(progress.current_stage, "case_enhancement");
}

#[tokio::test]
async fn prediction_failure_persists_fallback() {
    let store = seeded_store().await;
    let analysis = Arc::new(Analysis::failing_prediction());
    let orchestrator = orchestrator(store.clone(), analysis.clone(), Arc::new(CaseLaw::default()));

    let ctx = orchestrator.run_pipeline("case-7").await.unwrap();
    assert_eq!(
        ctx.prediction_analysis.as_ref().unwrap().source,
        PredictionSource::Fallback
    );

    let case = store.get_case("case-7").await.unwrap().unwrap();
    assert_eq!(case.processing_status, ProcessingStatus::Completed);
    assert!(case.ai_processed);

    let row = store.get_prediction("case-7").await.unwrap().unwrap();
    assert_eq!(row.prediction.source, PredictionSource::Fallback);
    assert!(row.prediction.is_within_bounds());

    let progress = orchestrator.tracker().get_progress("case-7").await.unwrap();
    assert_eq!(progress.errors.len(), 1);
    assert_eq!(progress.errors[0].stage, "prediction_analysis");

    let auxiliary = store
        .get_analysis("case-7", AnalysisKind::RiskAssessment)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(auxiliary.data["source"], "derived");
    assert!(
        analysis
            .calls()
            .iter()
            .all(|kind| !AnalysisKind::AUXILIARY.contains(kind))
    );
}

#[tokio::test]
async fn rerun_keeps_one_record_per_stage() {
    let store = seeded_store().await;
    let analysis = Arc::new(Analysis::default());
    let orchestrator = orchestrator(store.clone(), analysis.clone(), Arc::new(CaseLaw::default()));

    orchestrator.run_pipeline("case-7").await.unwrap();
    let first = store.get_prediction("case-7").await.unwrap().unwrap();
    orchestrator.run_pipeline("case-7").await.unwrap();

    let stages = store.list_stages("case-7").await.unwrap();
    assert_eq!(stages.len(), STAGE_NAMES.len());
    assert!(stages.iter().all(|s| s.status == StageStatus::Completed));

    let second = store.get_prediction("case-7").await.unwrap().unwrap();
    assert_eq!(second.prediction.outcome_prediction_score, 64.0);
    assert_eq!(first.prediction, second.prediction);

    let analyses = store.list_analyses("case-7").await.unwrap();
    assert_eq!(analyses.len(), 11);

    let calls = analysis.calls();
    assert_eq!(calls.len(), 10);
    assert!(calls.iter().all(|kind| !AnalysisKind::AUXILIARY.contains(kind)));
}

#[tokio::test]
async fn queued_run_completes_through_handler() {
    let store = seeded_store().await;
    let orchestrator = Arc::new(orchestrator(
        store.clone(),
        Arc::new(Analysis::default()),
        Arc::new(CaseLaw::default()),
    ));

    let config = QueueConfig {
        base_delay_ms: 5,
        ..QueueConfig::default()
    };
    let queue = Arc::new(JobQueue::new(config.clone()).with_store(store.clone()));
    queue
        .register_processor(
            &config.pipeline_queue,
            Arc::new(PipelineJobHandler::new(orchestrator.clone())),
        )
        .await;

    let trigger = CaseTrigger::new(store.clone(), queue.clone(), &config, 24);
    let job = tokio_test::assert_ok!(trigger.trigger_manual("case-7", false).await).unwrap();

    let done = queue
        .wait_for_job(&job.id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.result.as_ref().unwrap()["case_id"], "case-7");

    let case = store.get_case("case-7").await.unwrap().unwrap();
    assert_eq!(case.processing_status, ProcessingStatus::Completed);

    let status = queue.get_queue_status(&config.pipeline_queue).await;
    assert_eq!(status.completed, 1);
    assert_eq!(status.pending, 0);
}
