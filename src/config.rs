// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    pub default_max_attempts: u32,
    pub base_delay_ms: u64,
    pub job_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub rehydrate_on_start: bool,
    pub pipeline_queue: String,
    #[serde(default)]
    pub pipeline_priority: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub step_timeout_secs: u64,
    pub high_complexity_threshold: f64,
    pub medium_complexity_threshold: f64,
    pub max_case_law_matches: usize,
    pub stale_after_hours: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServicesConfig {
    pub extraction_url: String,
    pub analysis_url: String,
    pub analysis_api_key: Option<String>,
    pub analysis_timeout_secs: u64,
    pub case_law_url: String,
    pub case_law_api_token: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub data_path: PathBuf,
}

fn default_true() -> bool {
    true
}

impl QueueConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl PipelineConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            base_delay_ms: 1_000,
            job_timeout_secs: 300,
            rehydrate_on_start: true,
            pipeline_queue: "case-pipeline".to_string(),
            pipeline_priority: 0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 120,
            high_complexity_threshold: 70.0,
            medium_complexity_threshold: 40.0,
            max_case_law_matches: 10,
            stale_after_hours: 24,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CASE_PIPELINE")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
            services: ServicesConfig {
                extraction_url: "http://localhost:8081".to_string(),
                analysis_url: "http://localhost:8082".to_string(),
                analysis_api_key: None,
                analysis_timeout_secs: 60,
                case_law_url: "https://www.courtlistener.com/api/rest/v4".to_string(),
                case_law_api_token: None,
                user_agent: "case_pipeline/0.1".to_string(),
            },
            storage: StorageConfig {
                data_path: PathBuf::from("data/case_pipeline.db"),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.queue.default_max_attempts == 0 {
            return Err(PipelineError::Config(
                "default_max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.queue.job_timeout_secs == 0 || self.pipeline.step_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "job_timeout_secs and step_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.services.analysis_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "analysis_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let thresholds = [
            self.pipeline.high_complexity_threshold,
            self.pipeline.medium_complexity_threshold,
        ];
        if thresholds.iter().any(|t| !(0.0..=100.0).contains(t)) {
            return Err(PipelineError::Config(
                "complexity thresholds must be within 0..=100".to_string(),
            ));
        }

        if self.pipeline.medium_complexity_threshold > self.pipeline.high_complexity_threshold {
            return Err(PipelineError::Config(
                "medium_complexity_threshold cannot exceed high_complexity_threshold".to_string(),
            ));
        }

        if self.queue.pipeline_queue.trim().is_empty() {
            return Err(PipelineError::Config(
                "pipeline_queue must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.job_timeout(), Duration::from_secs(300));
        assert_eq!(config.queue.default_max_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default_config();
        config.queue.default_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default_config();
        config.pipeline.medium_complexity_threshold = 80.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            r#"
[queue]
default_max_attempts = 5
base_delay_ms = 250
job_timeout_secs = 60
pipeline_queue = "cases"

[pipeline]
step_timeout_secs = 30
high_complexity_threshold = 75.0
medium_complexity_threshold = 45.0
max_case_law_matches = 5
stale_after_hours = 12

[services]
extraction_url = "http://extract.local"
analysis_url = "http://analysis.local"
analysis_timeout_secs = 20
case_law_url = "http://caselaw.local"
user_agent = "test"

[storage]
data_path = "/tmp/cases.db"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.queue.default_max_attempts, 5);
        assert!(config.queue.rehydrate_on_start);
        assert_eq!(config.queue.pipeline_priority, 0);
        assert_eq!(config.pipeline.max_case_law_matches, 5);
        assert!(config.services.analysis_api_key.is_none());
    }
}
