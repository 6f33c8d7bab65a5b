// file: src/exporter/json.rs
// description: json export of a case with its stage history, analyses and prediction

use crate::database::CaseStore;
use crate::error::{PipelineError, Result};
use crate::models::{AnalysisRecord, CaseDocument, CaseRecord, PredictionRow, StageProgress};
use crate::pipeline::StageTracker;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct JsonExporter {
    output_dir: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct CaseExport {
    pub exported_at: String,
    pub case: CaseRecord,
    pub documents: Vec<CaseDocument>,
    pub progress: StageProgress,
    pub analyses: Vec<AnalysisRecord>,
    pub prediction: Option<PredictionRow>,
}

#[derive(Debug, Serialize)]
pub struct ExportManifest {
    pub exported_at: String,
    pub total_cases: usize,
    pub files: Vec<String>,
}

impl JsonExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn collect(
        &self,
        store: &dyn CaseStore,
        tracker: &StageTracker,
        case_id: &str,
    ) -> Result<CaseExport> {
        let case = store
            .get_case(case_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("case {}", case_id)))?;

        let (documents, progress, analyses, prediction) = tokio::try_join!(
            store.list_documents(case_id),
            tracker.get_progress(case_id),
            store.list_analyses(case_id),
            store.get_prediction(case_id),
        )?;

        Ok(CaseExport {
            exported_at: Utc::now().to_rfc3339(),
            case,
            documents,
            progress,
            analyses,
            prediction,
        })
    }

    pub async fn export_case(
        &self,
        store: &dyn CaseStore,
        tracker: &StageTracker,
        case_id: &str,
        pretty: bool,
    ) -> Result<PathBuf> {
        let export = self.collect(store, tracker, case_id).await?;

        let contents = if pretty {
            serde_json::to_string_pretty(&export)?
        } else {
            serde_json::to_string(&export)?
        };

        let path = self.output_dir.join(format!("{}.json", sanitize(case_id)));
        fs::write(&path, contents)?;

        info!("Exported case {} to {:?}", case_id, path);
        Ok(path)
    }

    pub async fn export_cases(
        &self,
        store: &dyn CaseStore,
        tracker: &StageTracker,
        case_ids: &[String],
        pretty: bool,
    ) -> Result<ExportManifest> {
        info!("Starting JSON export to {:?}", self.output_dir);

        let mut files = Vec::with_capacity(case_ids.len());
        for case_id in case_ids {
            let path = self.export_case(store, tracker, case_id, pretty).await?;
            files.push(path.display().to_string());
        }

        let manifest = ExportManifest {
            exported_at: Utc::now().to_rfc3339(),
            total_cases: files.len(),
            files,
        };

        fs::write(
            self.output_dir.join("manifest.json"),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        info!("Export complete: {} cases exported", manifest.total_cases);
        Ok(manifest)
    }
}

fn sanitize(case_id: &str) -> String {
    case_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
