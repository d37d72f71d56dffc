//! # Pipeline Models
//!
//! Records for pipeline executions, per-stage outcomes and metrics.

use crate::state_machine::{PipelineStatus, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Per-stage retry policy; delay after attempt `k` is `backoff_ms * exponential_base^k`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1_000,
            exponential_base: 2.0,
        }
    }
}

impl From<&crate::config::PipelineConfig> for RetryConfig {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            max_retries: config.default_max_retries,
            backoff_ms: config.default_backoff_ms,
            exponential_base: config.default_exponential_base,
        }
    }
}

/// Running totals for one stage name across pipeline runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub avg_duration_ms: f64,
}

impl StageMetrics {
    pub fn record_success(&mut self, duration: Duration) {
        self.successes += 1;
        self.record_execution(duration);
    }

    pub fn record_failure(&mut self, duration: Duration, timed_out: bool) {
        self.failures += 1;
        if timed_out {
            self.timeouts += 1;
        }
        self.record_execution(duration);
    }

    fn record_execution(&mut self, duration: Duration) {
        self.executions += 1;
        let sample = duration.as_secs_f64() * 1_000.0;
        self.avg_duration_ms += (sample - self.avg_duration_ms) / self.executions as f64;
    }

    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.successes as f64 / self.executions as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub dependencies: Vec<String>,
    pub timeout_ms: u64,
    pub retry_config: RetryConfig,
    pub attempts: u32,
    pub timed_out: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub pipeline_name: String,
    pub tenant_id: String,
    pub session_id: String,
    pub stages: Vec<StageRecord>,
    pub current_stage_index: usize,
    pub status: PipelineStatus,
    pub input_data: Value,
    /// Recorded stage outputs keyed by stage name
    pub output_data: Map<String, Value>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PipelineExecution {
    pub fn stages_completed(&self) -> usize {
        self.stages
            .iter()
            .filter(|stage| stage.status == StageStatus::Completed)
            .count()
    }

    pub fn has_output(&self, stage: &str) -> bool {
        self.output_data.contains_key(stage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub attempts: u32,
    pub duration_ms: Option<u64>,
    pub timed_out: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Caller-facing outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub execution_id: Uuid,
    pub status: PipelineStatus,
    pub stage_results: Vec<StageResult>,
    pub stages_completed: usize,
    pub total_stages: usize,
    pub total_duration_ms: u64,
    pub output_data: Value,
    pub recommendations: Vec<String>,
    /// Originating error when the run did not fully succeed
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_executions: u64,
    pub successful: u64,
    pub partial: u64,
    pub failed: u64,
    pub stages: BTreeMap<String, StageMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average() {
        let mut metrics = StageMetrics::default();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(300));
        metrics.record_failure(Duration::from_millis(500), true);

        assert_eq!(metrics.executions, 3);
        assert_eq!(metrics.successes, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.timeouts, 1);
        assert!((metrics.avg_duration_ms - 300.0).abs() < 1e-9);
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_retry_config_defaults() {
        let retry = RetryConfig::from(&crate::config::PipelineConfig::default());
        assert_eq!(retry, RetryConfig::default());
    }
}
