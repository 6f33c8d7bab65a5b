// file: src/models/job.rs
// description: deferred unit of work tracked by the job queue
// reference: priority/delay-aware job lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }
}

impl EnqueueOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue_name: String,
    pub payload: Value,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Enqueue order within this process; breaks ties between equal `created_at` values.
    #[serde(default)]
    pub sequence: u64,
}

impl Job {
    pub fn new(queue_name: &str, payload: Value, options: &EnqueueOptions, sequence: u64) -> Self {
        let now = Utc::now();
        let delay = chrono::Duration::from_std(options.delay).unwrap_or(chrono::Duration::zero());

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue_name: queue_name.to_string(),
            payload,
            status: JobStatus::Pending,
            priority: options.priority,
            attempts: 0,
            max_attempts: options.max_attempts.max(1),
            scheduled_for: now + delay,
            created_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
            sequence,
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for <= now
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: Value) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.error = None;
    }

    pub fn reschedule(&mut self, error: String, backoff: Duration) {
        let backoff = chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
        self.status = JobStatus::Pending;
        self.scheduled_for = Utc::now() + backoff;
        self.error = Some(error);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_is_pending_and_delayed() {
        let options = EnqueueOptions::default().with_delay(Duration::from_secs(60));
        let job = Job::new("cases", json!({"case_id": "c-1"}), &options, 1);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.scheduled_for > job.created_at);
        assert!(!job.is_eligible(Utc::now()));
    }

    #[test]
    fn test_attempts_never_exceed_max() {
        let options = EnqueueOptions::default().with_max_attempts(1);
        let mut job = Job::new("cases", json!(null), &options, 1);

        job.mark_processing();
        job.mark_processing();
        assert_eq!(job.attempts, 1);
        assert!(!job.can_retry());
    }

    #[test]
    fn test_max_attempts_floor_is_one() {
        let options = EnqueueOptions::default().with_max_attempts(0);
        assert_eq!(options.max_attempts, 1);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
