// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod database;
pub mod error;
pub mod exporter;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod services;
pub mod utils;

pub use config::{Config, PipelineConfig, QueueConfig, ServicesConfig, StorageConfig};
pub use database::{CaseBundle, CaseStore, JobStore, MemoryStore, SqliteStore, import_bundle};
pub use error::{PipelineError, Result};
pub use exporter::json::{CaseExport, ExportManifest, JsonExporter};
pub use models::{
    AnalysisKind, AnalysisRecord, CaseDocument, CaseRecord, EnqueueOptions, Job, JobStatus,
    PredictionRecord, PredictionSource, ProcessingStatus, StageProgress, StageStatus,
};
pub use pipeline::{
    CaseTrigger, PipelineBuilder, PipelineContext, PipelineJobHandler, PipelineOrchestrator,
    PipelineStep, StageTracker,
};
pub use queue::{JobHandler, JobQueue, QueueStatus};
pub use services::{AnalysisService, CaseLawSearch, PipelineServices, TextExtractor};
pub use utils::{FallbackSignals, OperationTimer, RunReport, Validator};
