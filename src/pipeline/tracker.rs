// file: src/pipeline/tracker.rs
// description: persisted stage history per case and the progress derived from it
// reference: progress tracking and statistics reporting for pipeline execution

use crate::database::CaseStore;
use crate::error::Result;
use crate::models::{StageError, StageProgress, StageRecord, StageStatus, StageSummary};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct StageTracker {
    store: Arc<dyn CaseStore>,
    expected_stages: Vec<String>,
}

impl StageTracker {
    pub fn new(store: Arc<dyn CaseStore>, expected_stages: Vec<String>) -> Self {
        Self {
            store,
            expected_stages,
        }
    }

    pub fn expected_stages(&self) -> &[String] {
        &self.expected_stages
    }

    /// Upserts the stage record. Storage failures are logged and never reach the caller.
    pub async fn record_stage(
        &self,
        case_id: &str,
        stage_name: &str,
        status: StageStatus,
        result: Option<Value>,
        error_message: Option<String>,
    ) {
        let now = Utc::now();

        let (started_at, completed_at) = match status {
            StageStatus::Started => (now, None),
            StageStatus::Completed | StageStatus::Failed => {
                (self.started_at(case_id, stage_name).await.unwrap_or(now), Some(now))
            }
        };

        let record = StageRecord {
            case_id: case_id.to_string(),
            stage_name: stage_name.to_string(),
            status,
            started_at,
            completed_at,
            result,
            error_message,
        };

        match self.store.upsert_stage(record).await {
            Ok(()) => debug!("Stage {} of case {} -> {}", stage_name, case_id, status.as_str()),
            Err(e) => warn!(
                "Failed to record stage {} ({}) for case {}: {}",
                stage_name,
                status.as_str(),
                case_id,
                e
            ),
        }
    }

    pub async fn get_progress(&self, case_id: &str) -> Result<StageProgress> {
        let records = self.store.list_stages(case_id).await?;
        Ok(compute_progress(&records, &self.expected_stages))
    }

    async fn started_at(&self, case_id: &str, stage_name: &str) -> Option<chrono::DateTime<Utc>> {
        match self.store.list_stages(case_id).await {
            Ok(records) => records
                .into_iter()
                .find(|r| r.stage_name == stage_name)
                .map(|r| r.started_at),
            Err(e) => {
                debug!("Could not read stage start for {}: {}", stage_name, e);
                None
            }
        }
    }
}

/// Derives progress from stage records. Failed stages do not count as progress; a failed
/// stage after the last completed one pins `current_stage` to that stage.
///
/// The first expected stage marks the start of the latest run. Records that started before
/// it belong to an earlier run and are ignored.
pub fn compute_progress<S: AsRef<str>>(records: &[StageRecord], expected: &[S]) -> StageProgress {
    let run_started = expected
        .first()
        .and_then(|first| records.iter().find(|r| r.stage_name == first.as_ref()))
        .map(|r| r.started_at);

    let by_name: HashMap<&str, &StageRecord> = records
        .iter()
        .filter(|r| run_started.is_none_or(|start| r.started_at >= start))
        .map(|r| (r.stage_name.as_str(), r))
        .collect();

    let status_of = |name: &str| by_name.get(name).map(|r| r.status);

    let completed = expected
        .iter()
        .filter(|name| status_of(name.as_ref()) == Some(StageStatus::Completed))
        .count();

    let percentage = if expected.is_empty() {
        0.0
    } else {
        ((completed as f64 / expected.len() as f64) * 1000.0).round() / 10.0
    };

    let last_completed = expected
        .iter()
        .rposition(|name| status_of(name.as_ref()) == Some(StageStatus::Completed));

    let frozen_at = expected.iter().enumerate().find(|(index, name)| {
        status_of(name.as_ref()) == Some(StageStatus::Failed)
            && last_completed.is_none_or(|last| *index > last)
    });

    let current_stage = match (frozen_at, last_completed) {
        (Some((_, name)), _) => name.as_ref().to_string(),
        (None, None) => "pending".to_string(),
        (None, Some(last)) if last + 1 >= expected.len() => "completed".to_string(),
        (None, Some(last)) => expected[last + 1].as_ref().to_string(),
    };

    let stages = expected
        .iter()
        .map(|name| {
            let record = by_name.get(name.as_ref());
            StageSummary {
                name: name.as_ref().to_string(),
                status: record.map(|r| r.status),
                started_at: record.map(|r| r.started_at),
                completed_at: record.and_then(|r| r.completed_at),
            }
        })
        .collect();

    let errors = expected
        .iter()
        .filter_map(|name| by_name.get(name.as_ref()))
        .filter(|r| r.status == StageStatus::Failed)
        .map(|r| StageError {
            stage: r.stage_name.clone(),
            message: r.error_message.clone().unwrap_or_default(),
        })
        .collect();

    StageProgress {
        percentage,
        current_stage,
        stages,
        errors,
    }
}
