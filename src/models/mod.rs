// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod analysis;
pub mod case;
pub mod job;
pub mod prediction;
pub mod stage;

pub use analysis::{AnalysisKind, AnalysisRecord, CaseLawMatch, OpinionText};
pub use case::{
    CaseDocument, CaseRecord, CaseStatusUpdate, DocumentExtraction, EvidenceItem, Party,
    ProcessingStatus,
};
pub use job::{EnqueueOptions, Job, JobStatus};
pub use prediction::{Level, PredictionRecord, PredictionRow, PredictionSource, Range};
pub use stage::{StageError, StageProgress, StageRecord, StageStatus, StageSummary};
