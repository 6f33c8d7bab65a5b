// file: src/database/sqlite.rs
// description: durable sqlite store with keyed upserts for cases, stages, analyses, predictions and jobs
// reference: https://docs.rs/sqlx

use crate::database::store::{CaseStore, JobStore};
use crate::error::{PipelineError, Result};
use crate::models::{
    AnalysisKind, AnalysisRecord, CaseDocument, CaseRecord, CaseStatusUpdate, DocumentExtraction,
    EvidenceItem, Job, JobStatus, Party, PredictionRow, StageRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const MAX_CONNECTIONS: u32 = 4;

const SCHEMA: [&str; 10] = [
    r#"
    CREATE TABLE IF NOT EXISTS cases (
        id                TEXT PRIMARY KEY,
        title             TEXT NOT NULL,
        case_type         TEXT NOT NULL,
        jurisdiction      TEXT NOT NULL,
        court             TEXT NULL,
        description       TEXT NOT NULL,
        processing_status TEXT NOT NULL,
        ai_processed      INTEGER NOT NULL,
        error_message     TEXT NULL,
        updated_at        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_documents (
        case_id     TEXT NOT NULL,
        document_id TEXT NOT NULL,
        file_name   TEXT NOT NULL,
        location    TEXT NOT NULL,
        uploaded_at TEXT NOT NULL,
        PRIMARY KEY (case_id, document_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_extractions (
        case_id      TEXT NOT NULL,
        document_id  TEXT NOT NULL,
        text         TEXT NOT NULL,
        page_count   INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        error        TEXT NULL,
        extracted_at TEXT NOT NULL,
        PRIMARY KEY (case_id, document_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_parties (
        case_id  TEXT NOT NULL,
        position INTEGER NOT NULL,
        name     TEXT NOT NULL,
        role     TEXT NOT NULL,
        counsel  TEXT NULL,
        PRIMARY KEY (case_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_evidence (
        case_id     TEXT NOT NULL,
        position    INTEGER NOT NULL,
        description TEXT NOT NULL,
        kind        TEXT NOT NULL,
        strength    REAL NULL,
        PRIMARY KEY (case_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_stages (
        case_id       TEXT NOT NULL,
        stage_name    TEXT NOT NULL,
        status        TEXT NOT NULL,
        started_at    TEXT NOT NULL,
        completed_at  TEXT NULL,
        result        TEXT NULL,
        error_message TEXT NULL,
        PRIMARY KEY (case_id, stage_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_analyses (
        case_id       TEXT NOT NULL,
        analysis_type TEXT NOT NULL,
        data          TEXT NOT NULL,
        updated_at    TEXT NOT NULL,
        PRIMARY KEY (case_id, analysis_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_predictions (
        case_id                  TEXT PRIMARY KEY,
        outcome_prediction_score REAL NOT NULL,
        risk_level               TEXT NOT NULL,
        source                   TEXT NOT NULL,
        prediction               TEXT NOT NULL,
        updated_at               TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id         TEXT PRIMARY KEY,
        queue_name TEXT NOT NULL,
        status     TEXT NOT NULL,
        priority   INTEGER NOT NULL,
        attempts   INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        data       TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_queue_status ON jobs (queue_name, status)",
];

/// Durable store backed by one sqlite file. Every write touches only the row named by its key.
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::Persistence(format!("Failed to create store directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                PipelineError::Persistence(format!("Failed to open store at {:?}: {}", path, e))
            })?;

        let store = Self { pool, path };
        store.migrate().await?;
        info!("Opened case store at {:?}", store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Store schema is up to date");
        Ok(())
    }
}

/// Reads a snake_case enum back from the text column it was written to.
fn parse_label<T: DeserializeOwned>(raw: String) -> Result<T> {
    serde_json::from_value(Value::String(raw.clone()))
        .map_err(|_| PipelineError::Persistence(format!("Unrecognised stored value '{}'", raw)))
}

fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn case_from_row(row: &SqliteRow) -> Result<CaseRecord> {
    Ok(CaseRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        case_type: row.try_get("case_type")?,
        jurisdiction: row.try_get("jurisdiction")?,
        court: row.try_get("court")?,
        description: row.try_get("description")?,
        processing_status: parse_label(row.try_get("processing_status")?)?,
        ai_processed: row.try_get("ai_processed")?,
        error_message: row.try_get("error_message")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn stage_from_row(row: &SqliteRow) -> Result<StageRecord> {
    let result: Option<String> = row.try_get("result")?;
    Ok(StageRecord {
        case_id: row.try_get("case_id")?,
        stage_name: row.try_get("stage_name")?,
        status: parse_label(row.try_get("status")?)?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        result: result.map(|raw| serde_json::from_str(&raw)).transpose()?,
        error_message: row.try_get("error_message")?,
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<AnalysisRecord> {
    let data: String = row.try_get("data")?;
    Ok(AnalysisRecord {
        case_id: row.try_get("case_id")?,
        analysis_type: parse_label(row.try_get("analysis_type")?)?,
        data: serde_json::from_str(&data)?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn extraction_from_row(row: &SqliteRow) -> Result<DocumentExtraction> {
    let page_count: i64 = row.try_get("page_count")?;
    Ok(DocumentExtraction {
        document_id: row.try_get("document_id")?,
        case_id: row.try_get("case_id")?,
        text: row.try_get("text")?,
        page_count: u32::try_from(page_count).unwrap_or_default(),
        content_hash: row.try_get("content_hash")?,
        error: row.try_get("error")?,
        extracted_at: row.try_get("extracted_at")?,
    })
}

#[async_trait]
impl CaseStore for SqliteStore {
    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>> {
        let row = sqlx::query("SELECT * FROM cases WHERE id = ?1")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(case_from_row).transpose()
    }

    async fn put_case(&self, case: CaseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cases (
                id, title, case_type, jurisdiction, court, description,
                processing_status, ai_processed, error_message, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                case_type = excluded.case_type,
                jurisdiction = excluded.jurisdiction,
                court = excluded.court,
                description = excluded.description,
                processing_status = excluded.processing_status,
                ai_processed = excluded.ai_processed,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&case.id)
        .bind(&case.title)
        .bind(&case.case_type)
        .bind(&case.jurisdiction)
        .bind(&case.court)
        .bind(&case.description)
        .bind(case.processing_status.as_str())
        .bind(case.ai_processed)
        .bind(&case.error_message)
        .bind(case.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_case_status(&self, case_id: &str, update: CaseStatusUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cases SET
                processing_status = ?2,
                ai_processed = COALESCE(?3, ai_processed),
                error_message = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(case_id)
        .bind(update.status.as_str())
        .bind(update.ai_processed)
        .bind(&update.error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("case {}", case_id)));
        }
        Ok(())
    }

    async fn list_documents(&self, case_id: &str) -> Result<Vec<CaseDocument>> {
        let rows = sqlx::query(
            "SELECT * FROM case_documents WHERE case_id = ?1 ORDER BY rowid",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CaseDocument> {
                Ok(CaseDocument {
                    id: row.try_get("document_id")?,
                    case_id: row.try_get("case_id")?,
                    file_name: row.try_get("file_name")?,
                    location: row.try_get("location")?,
                    uploaded_at: row.try_get("uploaded_at")?,
                })
            })
            .collect()
    }

    async fn add_document(&self, document: CaseDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO case_documents (case_id, document_id, file_name, location, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(case_id, document_id) DO UPDATE SET
                file_name = excluded.file_name,
                location = excluded.location,
                uploaded_at = excluded.uploaded_at
            "#,
        )
        .bind(&document.case_id)
        .bind(&document.id)
        .bind(&document.file_name)
        .bind(&document.location)
        .bind(document.uploaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_extraction(&self, extraction: DocumentExtraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_extractions (
                case_id, document_id, text, page_count, content_hash, error, extracted_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(case_id, document_id) DO UPDATE SET
                text = excluded.text,
                page_count = excluded.page_count,
                content_hash = excluded.content_hash,
                error = excluded.error,
                extracted_at = excluded.extracted_at
            "#,
        )
        .bind(&extraction.case_id)
        .bind(&extraction.document_id)
        .bind(&extraction.text)
        .bind(i64::from(extraction.page_count))
        .bind(&extraction.content_hash)
        .bind(&extraction.error)
        .bind(extraction.extracted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_extractions(&self, case_id: &str) -> Result<Vec<DocumentExtraction>> {
        let rows = sqlx::query(
            "SELECT * FROM document_extractions WHERE case_id = ?1 ORDER BY document_id",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(extraction_from_row).collect()
    }

    async fn list_parties(&self, case_id: &str) -> Result<Vec<Party>> {
        let rows = sqlx::query("SELECT * FROM case_parties WHERE case_id = ?1 ORDER BY position")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Party> {
                Ok(Party {
                    name: row.try_get("name")?,
                    role: row.try_get("role")?,
                    counsel: row.try_get("counsel")?,
                })
            })
            .collect()
    }

    async fn put_parties(&self, case_id: &str, parties: Vec<Party>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM case_parties WHERE case_id = ?1")
            .bind(case_id)
            .execute(&mut *tx)
            .await?;

        for (position, party) in parties.iter().enumerate() {
            sqlx::query(
                "INSERT INTO case_parties (case_id, position, name, role, counsel) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(case_id)
            .bind(position as i64)
            .bind(&party.name)
            .bind(&party.role)
            .bind(&party.counsel)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_evidence(&self, case_id: &str) -> Result<Vec<EvidenceItem>> {
        let rows = sqlx::query("SELECT * FROM case_evidence WHERE case_id = ?1 ORDER BY position")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<EvidenceItem> {
                Ok(EvidenceItem {
                    description: row.try_get("description")?,
                    kind: row.try_get("kind")?,
                    strength: row.try_get("strength")?,
                })
            })
            .collect()
    }

    async fn put_evidence(&self, case_id: &str, evidence: Vec<EvidenceItem>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM case_evidence WHERE case_id = ?1")
            .bind(case_id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in evidence.iter().enumerate() {
            sqlx::query(
                "INSERT INTO case_evidence (case_id, position, description, kind, strength) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(case_id)
            .bind(position as i64)
            .bind(&item.description)
            .bind(&item.kind)
            .bind(item.strength)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_stage(&self, record: StageRecord) -> Result<()> {
        let result = record.result.as_ref().map(to_json_text).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO case_stages (
                case_id, stage_name, status, started_at, completed_at, result, error_message
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(case_id, stage_name) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                result = excluded.result,
                error_message = excluded.error_message
            "#,
        )
        .bind(&record.case_id)
        .bind(&record.stage_name)
        .bind(record.status.as_str())
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(result)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_stages(&self, case_id: &str) -> Result<Vec<StageRecord>> {
        let rows = sqlx::query("SELECT * FROM case_stages WHERE case_id = ?1")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;

        let mut stages = rows.iter().map(stage_from_row).collect::<Result<Vec<_>>>()?;
        stages.sort_by_key(|record| record.started_at);
        Ok(stages)
    }

    async fn upsert_analysis(&self, record: AnalysisRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO case_analyses (case_id, analysis_type, data, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(case_id, analysis_type) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.case_id)
        .bind(record.analysis_type.as_str())
        .bind(to_json_text(&record.data)?)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analysis(
        &self,
        case_id: &str,
        kind: AnalysisKind,
    ) -> Result<Option<AnalysisRecord>> {
        let row = sqlx::query(
            "SELECT * FROM case_analyses WHERE case_id = ?1 AND analysis_type = ?2",
        )
        .bind(case_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(analysis_from_row).transpose()
    }

    async fn list_analyses(&self, case_id: &str) -> Result<Vec<AnalysisRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM case_analyses WHERE case_id = ?1 ORDER BY analysis_type",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(analysis_from_row).collect()
    }

    async fn upsert_prediction(&self, row: PredictionRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO case_predictions (
                case_id, outcome_prediction_score, risk_level, source, prediction, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(case_id) DO UPDATE SET
                outcome_prediction_score = excluded.outcome_prediction_score,
                risk_level = excluded.risk_level,
                source = excluded.source,
                prediction = excluded.prediction,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.case_id)
        .bind(row.prediction.outcome_prediction_score)
        .bind(row.prediction.risk_level.as_str())
        .bind(row.prediction.source.as_str())
        .bind(to_json_text(&row.prediction)?)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_prediction(&self, case_id: &str) -> Result<Option<PredictionRow>> {
        let row = sqlx::query("SELECT * FROM case_predictions WHERE case_id = ?1")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let prediction: String = row.try_get("prediction")?;
        Ok(Some(PredictionRow {
            case_id: row.try_get("case_id")?,
            prediction: serde_json::from_str(&prediction)?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn save_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue_name, status, priority, attempts, created_at, data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                priority = excluded.priority,
                attempts = excluded.attempts,
                data = excluded.data
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue_name)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(i64::from(job.attempts))
        .bind(job.created_at)
        .bind(to_json_text(job)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_jobs(&self, queue_name: Option<&str>) -> Result<Vec<Job>> {
        let rows = match queue_name {
            Some(name) => {
                sqlx::query("SELECT data FROM jobs WHERE queue_name = ?1")
                    .bind(name)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT data FROM jobs")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut jobs = rows
            .iter()
            .map(|row| -> Result<Job> {
                let data: String = row.try_get("data")?;
                Ok(serde_json::from_str(&data)?)
            })
            .collect::<Result<Vec<_>>>()?;

        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(jobs)
    }

    async fn job_counts(&self, queue_name: &str) -> Result<HashMap<JobStatus, usize>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS total FROM jobs WHERE queue_name = ?1 GROUP BY status",
        )
        .bind(queue_name)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let status: JobStatus = parse_label(row.try_get("status")?)?;
            let total: i64 = row.try_get("total")?;
            counts.insert(status, usize::try_from(total).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn purge_jobs(&self, queue_name: &str, statuses: &[JobStatus]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut purged = 0;

        for status in statuses {
            let result = sqlx::query("DELETE FROM jobs WHERE queue_name = ?1 AND status = ?2")
                .bind(queue_name)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;
            purged += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(purged)
    }
}
