// file: src/queue/manager.rs
// description: in-memory job queue with single-flight draining, backoff and best-effort mirroring
// reference: https://docs.rs/tokio/latest/tokio/sync/index.html

use crate::config::QueueConfig;
use crate::database::JobStore;
use crate::error::{PipelineError, Result};
use crate::models::{EnqueueOptions, Job, JobStatus};
use crate::queue::{JobHandler, QueueStatus};
use crate::utils::Validator;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Job queue shared by triggers and workers. The in-memory map is authoritative;
/// the optional job store only mirrors it.
pub struct JobQueue {
    config: QueueConfig,
    jobs: RwLock<HashMap<String, Job>>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    running: Mutex<HashSet<String>>,
    sequence: AtomicU64,
    job_store: Option<Arc<dyn JobStore>>,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            running: Mutex::new(HashSet::new()),
            sequence: AtomicU64::new(0),
            job_store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(store);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Options seeded from configuration: default attempts, no priority, no delay.
    pub fn default_options(&self) -> EnqueueOptions {
        EnqueueOptions::default().with_max_attempts(self.config.default_max_attempts)
    }

    pub async fn enqueue(
        self: &Arc<Self>,
        queue_name: &str,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<Job> {
        Validator::validate_identifier(queue_name, "queue name")?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let job = Job::new(queue_name, payload, &options, sequence);

        self.jobs.write().await.insert(job.id.clone(), job.clone());
        self.mirror(&job).await;

        info!(
            "Enqueued job {} on '{}' (priority {}, max attempts {})",
            job.id, queue_name, job.priority, job.max_attempts
        );

        if options.delay.is_zero() {
            self.spawn_processing(queue_name.to_string());
        } else {
            self.schedule_wakeup(queue_name.to_string(), job.scheduled_for);
        }

        Ok(job)
    }

    pub async fn register_processor(&self, queue_name: &str, handler: Arc<dyn JobHandler>) {
        self.handlers
            .write()
            .await
            .insert(queue_name.to_string(), handler);
        info!("Registered processor for queue '{}'", queue_name);
    }

    pub async fn has_processor(&self, queue_name: &str) -> bool {
        self.handlers.read().await.contains_key(queue_name)
    }

    pub async fn is_processing(&self, queue_name: &str) -> bool {
        self.running.lock().await.contains(queue_name)
    }

    /// Drains every eligible job of `queue_name`, one at a time. Returns immediately when the
    /// queue is already being drained or has no processor.
    pub async fn process_queue(self: &Arc<Self>, queue_name: &str) {
        loop {
            let Some(handler) = self.try_begin(queue_name).await else {
                return;
            };

            let mut processed = 0usize;
            while let Some(job_id) = self.next_eligible(queue_name).await {
                self.execute(&job_id, handler.as_ref()).await;
                processed += 1;
            }

            self.running.lock().await.remove(queue_name);
            if processed > 0 {
                debug!("Drained {} jobs from '{}'", processed, queue_name);
            }

            // A job enqueued while the guard was being released would otherwise be stranded.
            if self.next_eligible(queue_name).await.is_none() {
                break;
            }
        }

        if let Some(at) = self.earliest_pending(queue_name).await {
            self.schedule_wakeup(queue_name.to_string(), at);
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn list_jobs(&self, queue_name: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.queue_name == queue_name)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)));
        jobs
    }

    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: HashSet<String> = self
            .jobs
            .read()
            .await
            .values()
            .map(|job| job.queue_name.clone())
            .collect();
        names.extend(self.handlers.read().await.keys().cloned());

        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names
    }

    /// Counts per status. In-memory counts win; durable counts fill statuses the
    /// in-memory map has no jobs for.
    pub async fn get_queue_status(&self, queue_name: &str) -> QueueStatus {
        let mut memory: HashMap<JobStatus, usize> = HashMap::new();
        for job in self.jobs.read().await.values() {
            if job.queue_name == queue_name {
                *memory.entry(job.status).or_insert(0) += 1;
            }
        }

        let durable = match &self.job_store {
            Some(store) => match store.job_counts(queue_name).await {
                Ok(counts) => counts,
                Err(e) => {
                    warn!("Failed to read durable job counts for '{}': {}", queue_name, e);
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let mut status = QueueStatus {
            queue_name: queue_name.to_string(),
            is_processing: self.is_processing(queue_name).await,
            has_processor: self.has_processor(queue_name).await,
            ..QueueStatus::default()
        };

        for job_status in JobStatus::ALL {
            let count = match memory.get(&job_status) {
                Some(count) => *count,
                None => durable.get(&job_status).copied().unwrap_or(0),
            };
            status.set(job_status, count);
        }

        status
    }

    /// Reloads unfinished jobs from the job store. Jobs interrupted mid-run go back to
    /// `pending`, or to `failed` when they have no attempts left.
    pub async fn rehydrate(self: &Arc<Self>) -> Result<usize> {
        let Some(store) = &self.job_store else {
            return Ok(0);
        };

        let stored = store.load_jobs(None).await?;
        let mut restored = Vec::new();
        let mut queues = HashSet::new();

        {
            let mut jobs = self.jobs.write().await;
            for mut job in stored {
                if job.status.is_terminal() || jobs.contains_key(&job.id) {
                    continue;
                }

                if job.status == JobStatus::Processing {
                    if job.can_retry() {
                        job.status = JobStatus::Pending;
                    } else {
                        job.mark_failed("interrupted before completion".to_string());
                    }
                }

                self.sequence.fetch_max(job.sequence + 1, Ordering::SeqCst);
                queues.insert(job.queue_name.clone());
                jobs.insert(job.id.clone(), job.clone());
                restored.push(job);
            }
        }

        for job in &restored {
            self.mirror(job).await;
        }

        if !restored.is_empty() {
            info!("Rehydrated {} unfinished jobs", restored.len());
        }
        for queue_name in queues {
            self.spawn_processing(queue_name);
        }

        Ok(restored.len())
    }

    /// Removes terminal jobs from memory and from the job store.
    pub async fn purge(&self, queue_name: &str, statuses: &[JobStatus]) -> Result<usize> {
        if let Some(status) = statuses.iter().find(|s| !s.is_terminal()) {
            return Err(PipelineError::Queue(format!(
                "cannot purge {} jobs; only completed or failed jobs may be removed",
                status
            )));
        }

        let removed = {
            let mut jobs = self.jobs.write().await;
            let before = jobs.len();
            jobs.retain(|_, job| !(job.queue_name == queue_name && statuses.contains(&job.status)));
            before - jobs.len()
        };

        let mut purged = removed;
        if let Some(store) = &self.job_store {
            match store.purge_jobs(queue_name, statuses).await {
                Ok(count) => purged = purged.max(count),
                Err(e) => warn!("Failed to purge mirrored jobs for '{}': {}", queue_name, e),
            }
        }

        info!("Purged {} jobs from '{}'", purged, queue_name);
        Ok(purged)
    }

    /// Polls until the job reaches a terminal state.
    pub async fn wait_for_job(&self, job_id: &str, timeout: Duration) -> Result<Job> {
        let wait = async {
            loop {
                match self.get_job(job_id).await {
                    Some(job) if job.status.is_terminal() => return Ok(job),
                    Some(_) => tokio::time::sleep(POLL_INTERVAL).await,
                    None => return Err(PipelineError::NotFound(format!("job {}", job_id))),
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| PipelineError::Timeout {
                operation: format!("waiting for job {}", job_id),
                seconds: timeout.as_secs(),
            })?
    }

    fn spawn_processing(self: &Arc<Self>, queue_name: String) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.process_queue(&queue_name).await;
        });
    }

    fn schedule_wakeup(self: &Arc<Self>, queue_name: String, at: DateTime<Utc>) {
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let queue = Arc::clone(self);
        debug!("Waking '{}' in {}ms", queue_name, delay.as_millis());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.process_queue(&queue_name).await;
        });
    }

    async fn try_begin(&self, queue_name: &str) -> Option<Arc<dyn JobHandler>> {
        let mut running = self.running.lock().await;
        if running.contains(queue_name) {
            debug!("Queue '{}' is already being processed", queue_name);
            return None;
        }

        let handler = self.handlers.read().await.get(queue_name).cloned();
        if handler.is_none() {
            debug!("No processor registered for '{}'", queue_name);
            return None;
        }

        running.insert(queue_name.to_string());
        handler
    }

    async fn next_eligible(&self, queue_name: &str) -> Option<String> {
        let now = Utc::now();
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.queue_name == queue_name && job.is_eligible(now))
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.sequence.cmp(&b.sequence))
            })
            .map(|job| job.id.clone())
    }

    async fn earliest_pending(&self, queue_name: &str) -> Option<DateTime<Utc>> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.queue_name == queue_name && job.status == JobStatus::Pending)
            .map(|job| job.scheduled_for)
            .min()
    }

    async fn execute(&self, job_id: &str, handler: &dyn JobHandler) {
        let snapshot = {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            job.mark_processing();
            job.clone()
        };
        self.mirror(&snapshot).await;

        debug!(
            "Running job {} (attempt {}/{})",
            snapshot.id, snapshot.attempts, snapshot.max_attempts
        );

        let timeout = self.config.job_timeout();
        let outcome = match tokio::time::timeout(timeout, handler.handle(&snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                operation: format!("job {}", snapshot.id),
                seconds: timeout.as_secs(),
            }),
        };

        let updated = {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };

            match outcome {
                Ok(result) => {
                    job.mark_completed(result);
                    info!("Job {} completed after {} attempt(s)", job.id, job.attempts);
                }
                Err(e) if job.can_retry() => {
                    let backoff = self.backoff(job.attempts);
                    warn!(
                        "Job {} failed (attempt {}/{}), retrying in {}ms: {}",
                        job.id,
                        job.attempts,
                        job.max_attempts,
                        backoff.as_millis(),
                        e
                    );
                    job.reschedule(e.to_string(), backoff);
                }
                Err(e) => {
                    error!(
                        "Job {} failed permanently after {} attempts: {}",
                        job.id, job.attempts, e
                    );
                    job.mark_failed(e.to_string());
                }
            }
            job.clone()
        };
        self.mirror(&updated).await;
    }

    fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1u32 << attempts.min(16);
        self.config.base_delay().saturating_mul(factor)
    }

    async fn mirror(&self, job: &Job) {
        if let Some(store) = &self.job_store
            && let Err(e) = store.save_job(job).await
        {
            warn!("Failed to mirror job {} to the job store: {}", job.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::database::testing::FlakyStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn test_config() -> QueueConfig {
        QueueConfig {
            base_delay_ms: 5,
            job_timeout_secs: 1,
            ..QueueConfig::default()
        }
    }

    fn test_queue() -> Arc<JobQueue> {
        Arc::new(JobQueue::new(test_config()))
    }

    #[derive(Default)]
    struct Recorder {
        seen: StdMutex<Vec<(i64, DateTime<Utc>)>>,
        fail_first: usize,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        async fn handle(&self, job: &Job) -> Result<Value> {
            let mut seen = self.seen.lock().unwrap();
            seen.push((job.payload["n"].as_i64().unwrap_or(-1), job.scheduled_for));
            if seen.len() <= self.fail_first {
                return Err(PipelineError::collaborator("test", "transient failure"));
            }
            Ok(json!({"ok": true}))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn handle(&self, _job: &Job) -> Result<Value> {
            Err(PipelineError::collaborator("test", "boom"))
        }
    }

    struct Sleeper;

    #[async_trait]
    impl JobHandler for Sleeper {
        async fn handle(&self, _job: &Job) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!(null))
        }
    }

    #[tokio::test]
    async fn test_drains_by_priority() {
        let queue = test_queue();
        for (n, priority) in [(1, 1), (5, 5), (3, 3)] {
            queue
                .enqueue("q", json!({"n": n}), EnqueueOptions::default().with_priority(priority))
                .await
                .unwrap();
        }

        let recorder = Arc::new(Recorder::default());
        queue.register_processor("q", recorder.clone()).await;
        queue.process_queue("q").await;

        let order: Vec<i64> = recorder.seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![5, 3, 1]);
        assert_eq!(queue.get_queue_status("q").await.completed, 3);
    }

    #[tokio::test]
    async fn test_equal_priority_is_fifo() {
        let queue = test_queue();
        for n in 0..4 {
            queue.enqueue("q", json!({"n": n}), EnqueueOptions::default()).await.unwrap();
        }

        let recorder = Arc::new(Recorder::default());
        queue.register_processor("q", recorder.clone()).await;
        queue.process_queue("q").await;

        let order: Vec<i64> = recorder.seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_retries_with_backoff_then_completes() {
        let queue = test_queue();
        let recorder = Arc::new(Recorder {
            fail_first: 2,
            ..Recorder::default()
        });

        let job = queue
            .enqueue("q", json!({"n": 7}), EnqueueOptions::default().with_max_attempts(3))
            .await
            .unwrap();
        queue.register_processor("q", recorder.clone()).await;
        queue.process_queue("q").await;

        let done = queue.wait_for_job(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.attempts, 3);
        assert_eq!(done.result, Some(json!({"ok": true})));

        let scheduled: Vec<DateTime<Utc>> =
            recorder.seen.lock().unwrap().iter().map(|(_, at)| *at).collect();
        assert_eq!(scheduled.len(), 3);
        assert!(scheduled.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_exhausted_job_fails_and_stays_failed() {
        let queue = test_queue();
        let job = queue
            .enqueue("q", json!({}), EnqueueOptions::default().with_max_attempts(3))
            .await
            .unwrap();
        queue.register_processor("q", Arc::new(AlwaysFails)).await;
        queue.process_queue("q").await;

        let failed = queue.wait_for_job(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert!(failed.failed_at.is_some());
        assert!(failed.error.as_deref().unwrap_or_default().contains("boom"));

        queue.process_queue("q").await;
        let again = queue.get_job(&job.id).await.unwrap();
        assert_eq!(again.attempts, 3);
        assert_eq!(again.status, JobStatus::Failed);
    }

    struct MissingCase;

    #[async_trait]
    impl JobHandler for MissingCase {
        async fn handle(&self, _job: &Job) -> Result<Value> {
            Err(PipelineError::NotFound("case gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_every_error_kind_uses_the_retry_budget() {
        let queue = test_queue();
        let job = queue
            .enqueue("q", json!({}), EnqueueOptions::default().with_max_attempts(2))
            .await
            .unwrap();
        queue.register_processor("q", Arc::new(MissingCase)).await;
        queue.process_queue("q").await;

        let failed = queue.wait_for_job(&job.id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.attempts, 2);
        assert!(failed.error.unwrap().contains("case gone"));
    }

    #[tokio::test]
    async fn test_handler_timeout_counts_as_failure() {
        let queue = test_queue();
        let job = queue
            .enqueue("slow", json!({}), EnqueueOptions::default().with_max_attempts(1))
            .await
            .unwrap();
        queue.register_processor("slow", Arc::new(Sleeper)).await;
        queue.process_queue("slow").await;

        let failed = queue.get_job(&job.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_without_processor_jobs_stay_pending() {
        let queue = test_queue();
        let job = queue.enqueue("idle", json!({}), EnqueueOptions::default()).await.unwrap();
        queue.process_queue("idle").await;

        let status = queue.get_queue_status("idle").await;
        assert_eq!(status.pending, 1);
        assert!(!status.has_processor);
        assert!(!status.is_processing);
        assert_eq!(queue.get_job(&job.id).await.unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_delayed_job_is_not_eligible_yet() {
        let queue = test_queue();
        queue.register_processor("later", Arc::new(Recorder::default())).await;
        let job = queue
            .enqueue(
                "later",
                json!({}),
                EnqueueOptions::default().with_delay(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        queue.process_queue("later").await;
        let pending = queue.get_job(&job.id).await.unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert_eq!(pending.attempts, 0);
    }

    #[tokio::test]
    async fn test_status_merges_durable_counts() {
        let store = Arc::new(MemoryStore::new());
        let mut old = Job::new("q", json!({}), &EnqueueOptions::default(), 0);
        old.mark_failed("old failure".to_string());
        store.save_job(&old).await.unwrap();

        let queue = Arc::new(JobQueue::new(test_config()).with_store(store.clone()));
        queue.enqueue("q", json!({}), EnqueueOptions::default()).await.unwrap();

        let status = queue.get_queue_status("q").await;
        assert_eq!(status.pending, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.total(), 2);
    }

    #[tokio::test]
    async fn test_rehydrate_resets_interrupted_jobs() {
        let store = Arc::new(MemoryStore::new());

        let mut interrupted = Job::new("q", json!({"n": 1}), &EnqueueOptions::default(), 4);
        interrupted.mark_processing();
        store.save_job(&interrupted).await.unwrap();

        let mut exhausted = Job::new(
            "q",
            json!({"n": 2}),
            &EnqueueOptions::default().with_max_attempts(1),
            5,
        );
        exhausted.mark_processing();
        store.save_job(&exhausted).await.unwrap();

        let mut done = Job::new("q", json!({"n": 3}), &EnqueueOptions::default(), 6);
        done.mark_completed(json!(null));
        store.save_job(&done).await.unwrap();

        let queue = Arc::new(JobQueue::new(test_config()).with_store(store.clone()));
        assert_eq!(queue.rehydrate().await.unwrap(), 2);

        let restored = queue.get_job(&interrupted.id).await.unwrap();
        assert_eq!(restored.status, JobStatus::Pending);
        assert_eq!(restored.attempts, 1);
        assert_eq!(
            queue.get_job(&exhausted.id).await.unwrap().status,
            JobStatus::Failed
        );
        assert!(queue.get_job(&done.id).await.is_none());

        let next = queue.enqueue("q", json!({}), EnqueueOptions::default()).await.unwrap();
        assert!(next.sequence > 5);
    }

    #[tokio::test]
    async fn test_purge_rejects_live_statuses() {
        let queue = test_queue();
        queue.register_processor("q", Arc::new(Recorder::default())).await;
        queue.enqueue("q", json!({}), EnqueueOptions::default()).await.unwrap();
        queue.process_queue("q").await;

        assert!(queue.purge("q", &[JobStatus::Pending]).await.is_err());
        assert_eq!(queue.purge("q", &[JobStatus::Completed]).await.unwrap(), 1);
        assert_eq!(queue.get_queue_status("q").await.total(), 0);
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_block_enqueue() {
        let store = Arc::new(FlakyStore::failing_writes());
        let queue = Arc::new(JobQueue::new(test_config()).with_store(store.clone()));

        let job = queue.enqueue("q", json!({}), EnqueueOptions::default()).await.unwrap();
        queue.register_processor("q", Arc::new(Recorder::default())).await;
        queue.process_queue("q").await;

        assert_eq!(queue.get_job(&job.id).await.unwrap().status, JobStatus::Completed);
        assert!(store.load_jobs(Some("q")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_queue_name() {
        let queue = test_queue();
        assert!(queue.enqueue(" ", json!({}), EnqueueOptions::default()).await.is_err());
    }
}
