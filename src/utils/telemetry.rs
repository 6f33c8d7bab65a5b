// file: src/utils/telemetry.rs
// description: timing of pipeline steps and per-run execution reports
// reference: Production observability best practices

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Operation timer for step and run durations
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        debug!("Starting operation: {}", operation);
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        debug!(
            "Completed operation: {} in {:.2}s",
            self.operation,
            elapsed.as_secs_f64()
        );
        elapsed
    }

    pub fn warn_if_slow(&self, threshold: Duration) {
        let elapsed = self.elapsed();
        if elapsed > threshold {
            warn!(
                "Slow operation [{}] took {:.2}s (threshold: {:.2}s)",
                self.operation,
                elapsed.as_secs_f64(),
                threshold.as_secs_f64()
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Recovered,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Summary of one pipeline run, logged when the run ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub case_id: String,
    pub steps: Vec<StepTiming>,
    pub total_ms: u64,
}

impl RunReport {
    pub fn new(case_id: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, step: &str, outcome: StepOutcome, duration: Duration) {
        self.steps.push(StepTiming {
            step: step.to_string(),
            outcome,
            duration_ms: duration.as_millis() as u64,
        });
    }

    pub fn recovered_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Recovered)
            .map(|s| s.step.as_str())
            .collect()
    }

    pub fn finish(&mut self, total: Duration) {
        self.total_ms = total.as_millis() as u64;
    }

    pub fn log(&self) {
        info!("=== Pipeline run summary: case {} ===", self.case_id);
        for timing in &self.steps {
            info!(
                "  {:<24} {:>8}ms  {:?}",
                timing.step, timing.duration_ms, timing.outcome
            );
        }
        let recovered = self.recovered_steps();
        if !recovered.is_empty() {
            warn!("Steps recovered with fallback data: {}", recovered.join(", "));
        }
        info!("Total: {}ms over {} steps", self.total_ms, self.steps.len());
    }
}
