// file: src/queue/mod.rs
// description: deferred job execution with priorities, delays and bounded retries
// reference: internal module structure

pub mod manager;

use crate::error::Result;
use crate::models::{Job, JobStatus};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use manager::JobQueue;

/// Processes jobs of one queue. The returned value is stored as the job result.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<Value>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_name: String,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub is_processing: bool,
    pub has_processor: bool,
}

impl QueueStatus {
    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
        }
    }

    fn set(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Pending => self.pending = count,
            JobStatus::Processing => self.processing = count,
            JobStatus::Completed => self.completed = count,
            JobStatus::Failed => self.failed = count,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}
