// file: src/pipeline/orchestrator.rs
// description: runs the ordered steps for one case, threading context and applying failure policies
// reference: orchestrates asynchronous ingestion workflow

use crate::config::PipelineConfig;
use crate::database::CaseStore;
use crate::error::{PipelineError, Result};
use crate::models::{CaseStatusUpdate, ProcessingStatus, StageStatus};
use crate::pipeline::builder::{Pipeline, PipelineBuilder};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::step::{FailurePolicy, PipelineStep, StepResources};
use crate::pipeline::steps::default_steps;
use crate::pipeline::tracker::StageTracker;
use crate::services::PipelineServices;
use crate::utils::{OperationTimer, RunReport, StepOutcome};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct PipelineOrchestrator {
    resources: StepResources,
    tracker: StageTracker,
    pipeline: Pipeline,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn CaseStore>,
        services: PipelineServices,
        config: PipelineConfig,
    ) -> Result<Self> {
        let pipeline = PipelineBuilder::new().steps(default_steps()).build()?;
        Ok(Self::with_pipeline(store, services, config, pipeline))
    }

    pub fn with_pipeline(
        store: Arc<dyn CaseStore>,
        services: PipelineServices,
        config: PipelineConfig,
        pipeline: Pipeline,
    ) -> Self {
        let tracker = StageTracker::new(store.clone(), pipeline.stage_names());
        Self {
            resources: StepResources {
                store,
                services,
                config,
            },
            tracker,
            pipeline,
        }
    }

    pub fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.pipeline.stage_names()
    }

    pub async fn run_pipeline(&self, case_id: &str) -> Result<PipelineContext> {
        let run_timer = OperationTimer::new(&format!("pipeline run for case {}", case_id));
        let store = &self.resources.store;

        let case = store
            .get_case(case_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("case {}", case_id)))?;

        store
            .update_case_status(case_id, CaseStatusUpdate::status(ProcessingStatus::Processing))
            .await?;

        info!(
            "Starting pipeline for case {} ({} steps)",
            case_id,
            self.pipeline.len()
        );

        let mut ctx = PipelineContext::new(case);
        let mut report = RunReport::new(case_id);

        for (index, step) in self.pipeline.steps().iter().enumerate() {
            let step_index = index + 1;
            let name = step.name();

            self.tracker
                .record_stage(case_id, name, StageStatus::Started, None, None)
                .await;
            let step_timer = OperationTimer::new(name);

            let outcome = self.run_step(step.as_ref(), &mut ctx).await;
            step_timer.warn_if_slow(self.resources.config.step_timeout() / 2);

            let error = match outcome {
                Ok(result) => {
                    self.tracker
                        .record_stage(case_id, name, StageStatus::Completed, Some(result), None)
                        .await;
                    report.record(name, StepOutcome::Completed, step_timer.finish());
                    continue;
                }
                Err(e) => e,
            };

            if step.policy() == FailurePolicy::SoftFail {
                match step.recover(&mut ctx, &self.resources, &error).await {
                    Ok(fallback) => {
                        warn!(
                            "Step {} ({}) failed for case {}, continuing with fallback: {}",
                            name, step_index, case_id, error
                        );
                        self.tracker
                            .record_stage(
                                case_id,
                                name,
                                StageStatus::Failed,
                                Some(json!({ "fallback": fallback })),
                                Some(error.to_string()),
                            )
                            .await;
                        report.record(name, StepOutcome::Recovered, step_timer.finish());
                        continue;
                    }
                    Err(recover_error) => {
                        error!("Fallback for step {} failed: {}", name, recover_error);
                    }
                }
            }

            report.record(name, StepOutcome::Aborted, step_timer.finish());
            report.finish(run_timer.finish());
            report.log();
            return Err(self.abort(case_id, name, step_index, error).await);
        }

        if let Err(e) = store
            .update_case_status(case_id, CaseStatusUpdate::completed())
            .await
        {
            error!("Failed to mark case {} completed: {}", case_id, e);
        }

        report.finish(run_timer.finish());
        report.log();
        info!("Pipeline completed for case {}", case_id);
        Ok(ctx)
    }

    async fn run_step(&self, step: &dyn PipelineStep, ctx: &mut PipelineContext) -> Result<Value> {
        ctx.ensure(step.requires())?;

        let timeout = self.resources.config.step_timeout();
        match tokio::time::timeout(timeout, step.run(ctx, &self.resources)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                operation: format!("step {}", step.name()),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn abort(
        &self,
        case_id: &str,
        step_name: &str,
        step_index: usize,
        source: PipelineError,
    ) -> PipelineError {
        let message = format!("{} (step {}): {}", step_name, step_index, source);
        error!("Pipeline aborted for case {}: {}", case_id, message);

        self.tracker
            .record_stage(
                case_id,
                step_name,
                StageStatus::Failed,
                None,
                Some(source.to_string()),
            )
            .await;

        if let Err(e) = self
            .resources
            .store
            .update_case_status(case_id, CaseStatusUpdate::failed(message))
            .await
        {
            error!("Failed to mark case {} failed: {}", case_id, e);
        }

        PipelineError::StepAborted {
            step_name: step_name.to_string(),
            step_index,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::{AnalysisKind, CaseDocument, CaseRecord, PredictionSource};
    use crate::services::testing::{ScriptedAnalysis, StaticCaseLaw, StaticExtractor, services};
    use crate::pipeline::steps::STAGE_NAMES;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::time::Duration;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut case = CaseRecord::new("case-1", "Acme v. Widget");
        case.case_type = "contract".to_string();
        store.put_case(case).await.unwrap();
        for (id, name) in [("d1", "complaint.pdf"), ("d2", "exhibit.pdf")] {
            store
                .add_document(CaseDocument {
                    id: id.to_string(),
                    case_id: "case-1".to_string(),
                    file_name: name.to_string(),
                    location: format!("/uploads/{}", name),
                    uploaded_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_full_run_completes_case() {
        let store = seeded_store().await;
        let analysis = Arc::new(ScriptedAnalysis::default());
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            services(StaticExtractor::default(), analysis.clone(), StaticCaseLaw::default()),
            PipelineConfig::default(),
        )
        .unwrap();

        let ctx = orchestrator.run_pipeline("case-1").await.unwrap();
        let prediction = ctx.prediction_analysis.unwrap();
        assert_eq!(prediction.source, PredictionSource::Analysis);
        assert_eq!(prediction.outcome_prediction_score, 72.0);
        assert!(prediction.estimated_cost.min <= prediction.estimated_cost.max);
        assert_eq!(ctx.opinion_texts.unwrap().len(), 2);

        let case = store.get_case("case-1").await.unwrap().unwrap();
        assert_eq!(case.processing_status, ProcessingStatus::Completed);
        assert!(case.ai_processed);

        let progress = orchestrator.tracker().get_progress("case-1").await.unwrap();
        assert_eq!(progress.percentage, 100.0);
        assert_eq!(progress.current_stage, "completed");
        assert_eq!(progress.stages.len(), STAGE_NAMES.len());
        assert_eq!(store.list_analyses("case-1").await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_failed_document_does_not_stop_extraction() {
        let store = seeded_store().await;
        let extractor = StaticExtractor {
            failing_documents: ["d2".to_string()].into_iter().collect(),
        };
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            services(extractor, Arc::new(ScriptedAnalysis::default()), StaticCaseLaw::default()),
            PipelineConfig::default(),
        )
        .unwrap();

        let ctx = orchestrator.run_pipeline("case-1").await.unwrap();
        let content = ctx.extracted_content.unwrap();
        assert_eq!(content.document_count, 2);
        assert_eq!(content.extracted_count, 1);
        assert_eq!(content.failed_documents, vec!["exhibit.pdf".to_string()]);

        let extractions = store.list_extractions("case-1").await.unwrap();
        assert_eq!(extractions.len(), 2);
        assert_eq!(extractions.iter().filter(|e| e.error.is_some()).count(), 1);
    }

    fn with_case_law(store: Arc<MemoryStore>, case_law: StaticCaseLaw) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            store,
            services(
                StaticExtractor::default(),
                Arc::new(ScriptedAnalysis::default()),
                case_law,
            ),
            PipelineConfig::default(),
        )
        .unwrap()
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn assert_aborted_at(err: PipelineError, expected_name: &str, expected_index: usize) {
        match err {
            PipelineError::StepAborted {
                step_name,
                step_index,
                ..
            } => {
                assert_eq!(step_name, expected_name);
                assert_eq!(step_index, expected_index);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_auxiliary_analyses_are_derived_without_calls() {
        let store = seeded_store().await;
        let analysis = Arc::new(ScriptedAnalysis::default());
        let orchestrator = PipelineOrchestrator::new(
            store.clone(),
            services(StaticExtractor::default(), analysis.clone(), StaticCaseLaw::default()),
            PipelineConfig::default(),
        )
        .unwrap();

        orchestrator.run_pipeline("case-1").await.unwrap();

        let calls = analysis.calls();
        assert!(calls.iter().all(|kind| !AnalysisKind::AUXILIARY.contains(kind)));
        assert_eq!(calls.last(), Some(&AnalysisKind::Prediction));

        let trends = store
            .get_analysis("case-1", AnalysisKind::JudgeTrends)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trends.data["source"], "derived");

        let progress = orchestrator.tracker().get_progress("case-1").await.unwrap();
        assert!(progress.errors.is_empty());
    }

    #[tokio::test]
    async fn test_failed_opinion_fetches_are_skipped() {
        let store = seeded_store().await;
        let orchestrator = with_case_law(
            store.clone(),
            StaticCaseLaw {
                failing_opinions: ids(&["2"]),
                ..StaticCaseLaw::default()
            },
        );

        let ctx = orchestrator.run_pipeline("case-1").await.unwrap();
        let opinions = ctx.opinion_texts.unwrap();
        assert_eq!(opinions.len(), 1);
        assert_eq!(opinions[0].case_law_id, "1");

        let case = store.get_case("case-1").await.unwrap().unwrap();
        assert_eq!(case.processing_status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn test_every_opinion_fetch_failing_aborts_run() {
        let store = seeded_store().await;
        let orchestrator = with_case_law(
            store.clone(),
            StaticCaseLaw {
                failing_opinions: ids(&["1", "2"]),
                ..StaticCaseLaw::default()
            },
        );

        let err = orchestrator.run_pipeline("case-1").await.unwrap_err();
        assert_aborted_at(err, "opinion_fetch", 8);

        let case = store.get_case("case-1").await.unwrap().unwrap();
        assert_eq!(case.processing_status, ProcessingStatus::Failed);
        assert!(case.error_message.unwrap().starts_with("opinion_fetch (step 8):"));
        assert!(store.get_prediction("case-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refined_search_failure_aborts_run() {
        let store = seeded_store().await;
        let orchestrator = with_case_law(
            store.clone(),
            StaticCaseLaw {
                failing_terms: ids(&["unjust enrichment"]),
                ..StaticCaseLaw::default()
            },
        );

        let err = orchestrator.run_pipeline("case-1").await.unwrap_err();
        assert_aborted_at(err, "case_law_refinement", 7);

        let progress = orchestrator.tracker().get_progress("case-1").await.unwrap();
        assert_eq!(progress.current_stage, "case_law_refinement");
        assert_eq!(progress.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_case_is_not_found() {
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(MemoryStore::new()),
            services(
                StaticExtractor::default(),
                Arc::new(ScriptedAnalysis::default()),
                StaticCaseLaw::default(),
            ),
            PipelineConfig::default(),
        )
        .unwrap();

        let result = orchestrator.run_pipeline("missing").await;
        assert!(matches!(result, Err(PipelineError::NotFound(_))));
    }

    struct Stalls;

    #[async_trait]
    impl PipelineStep for Stalls {
        fn name(&self) -> &'static str {
            "stalls"
        }

        fn policy(&self) -> FailurePolicy {
            FailurePolicy::SoftFail
        }

        async fn run(&self, _ctx: &mut PipelineContext, _res: &StepResources) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_step_timeout_without_fallback_aborts() {
        let store = seeded_store().await;
        let pipeline = PipelineBuilder::new().step(Arc::new(Stalls)).build().unwrap();
        let config = PipelineConfig {
            step_timeout_secs: 1,
            ..PipelineConfig::default()
        };
        let orchestrator = PipelineOrchestrator::with_pipeline(
            store.clone(),
            services(
                StaticExtractor::default(),
                Arc::new(ScriptedAnalysis::default()),
                StaticCaseLaw::default(),
            ),
            config,
            pipeline,
        );

        let err = orchestrator.run_pipeline("case-1").await.unwrap_err();
        match err {
            PipelineError::StepAborted {
                step_name,
                step_index,
                source,
            } => {
                assert_eq!(step_name, "stalls");
                assert_eq!(step_index, 1);
                assert!(matches!(*source, PipelineError::Timeout { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }

        let case = store.get_case("case-1").await.unwrap().unwrap();
        assert_eq!(case.processing_status, ProcessingStatus::Failed);
        assert!(case.error_message.unwrap().starts_with("stalls (step 1):"));
    }
}
