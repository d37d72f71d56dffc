//! # Orchestrator Configuration
//!
//! Layered configuration for every orchestration component.
//!
//! ## Sources (lowest to highest precedence)
//!
//! 1. Built-in defaults ([`OrchestratorConfig::default`])
//! 2. `config/viralize.toml`
//! 3. `config/viralize.<environment>.toml`
//! 4. Environment variables, e.g. `VIRALIZE__SAGA__DEFAULT_MAX_RETRIES=5`
//!
//! Durations are stored as integer `*_ms` / `*_seconds` fields so files stay
//! readable; accessor methods return [`Duration`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use viralize_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retries = manager.config().saga.default_max_retries;
//! let sweep = manager.config().heartbeat.sweep_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Deployment environment name (development, test, production)
    pub environment: String,
    pub event_bus: EventBusConfig,
    pub planner: PlannerConfig,
    pub saga: SagaConfig,
    pub pipeline: PipelineConfig,
    pub heartbeat: HeartbeatConfig,
    pub logging: LoggingConfig,
}

impl OrchestratorConfig {
    /// Reject configurations that would stall or spin the runtime
    pub fn validate(&self) -> ConfigResult<()> {
        self.event_bus.validate()?;
        self.planner.validate()?;
        self.saga.validate()?;
        self.pipeline.validate()?;
        self.heartbeat.validate()?;
        Ok(())
    }
}

/// Event bus delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Prefix for channel names (`<prefix>.<event_type>`)
    pub channel_prefix: String,
    pub dead_letter_channel: String,
    /// Retry budget applied when a publisher does not specify one
    pub default_max_retries: u32,
    pub base_backoff_ms: u64,
    /// Upper bound of the uniform jitter added to every backoff
    pub max_jitter_ms: u64,
    pub max_backoff_ms: u64,
    /// Dead-lettered events kept in memory for inspection and replay
    pub dead_letter_retention: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_prefix: crate::constants::channels::DEFAULT_PREFIX.to_string(),
            dead_letter_channel: crate::constants::channels::DEFAULT_DEAD_LETTER.to_string(),
            default_max_retries: 3,
            base_backoff_ms: 1_000,
            max_jitter_ms: 1_000,
            max_backoff_ms: crate::constants::system::MAX_EVENT_BACKOFF_MS,
            dead_letter_retention: 1_000,
        }
    }
}

impl EventBusConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Channel name for an event type
    pub fn channel_for(&self, event_type: &str) -> String {
        format!("{}.{}", self.channel_prefix, event_type)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.channel_prefix.is_empty() {
            return Err(ConfigurationError::MissingRequiredField {
                field: "channel_prefix".to_string(),
                context: "event_bus".to_string(),
            });
        }
        if self.max_backoff_ms > crate::constants::system::MAX_EVENT_BACKOFF_MS {
            return Err(ConfigurationError::invalid_value(
                "event_bus.max_backoff_ms",
                self.max_backoff_ms,
                "event retry backoff is capped at 30000ms",
            ));
        }
        Ok(())
    }
}

/// Task planner thresholds and cost table
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Audience above which an audience-analysis action is planned
    pub large_audience_threshold: u64,
    /// Audience below which the plan carries a small-audience risk
    pub small_audience_threshold: u64,
    pub high_engagement_threshold: f64,
    pub positive_sentiment_threshold: f64,
    pub negative_sentiment_threshold: f64,
    pub video_content_types: Vec<String>,
    /// Flat cost added per planned action
    pub per_action_cost: f64,
    pub capability_costs: HashMap<String, f64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let capability_costs = [
            ("analytics", 0.5),
            ("video_generation", 5.0),
            ("content_creation", 1.0),
            ("text_generation", 0.8),
            ("scheduling", 0.2),
            ("publishing", 0.3),
        ]
        .into_iter()
        .map(|(name, cost)| (name.to_string(), cost))
        .collect();

        Self {
            large_audience_threshold: 10_000,
            small_audience_threshold: 1_000,
            high_engagement_threshold: 0.05,
            positive_sentiment_threshold: 0.3,
            negative_sentiment_threshold: -0.5,
            video_content_types: ["video", "short_video", "reel", "story"]
                .into_iter()
                .map(String::from)
                .collect(),
            per_action_cost: 0.1,
            capability_costs,
        }
    }
}

impl PlannerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.high_engagement_threshold) {
            return Err(ConfigurationError::invalid_value(
                "planner.high_engagement_threshold",
                self.high_engagement_threshold,
                "must be within [0, 1]",
            ));
        }
        if self.small_audience_threshold > self.large_audience_threshold {
            return Err(ConfigurationError::invalid_value(
                "planner.small_audience_threshold",
                self.small_audience_threshold,
                "must not exceed large_audience_threshold",
            ));
        }
        Ok(())
    }
}

/// Saga executor defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SagaConfig {
    pub default_step_timeout_ms: u64,
    /// Upper bound for a step timeout derived from an action's estimated duration
    pub max_step_timeout_ms: u64,
    pub default_max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_retry_backoff_ms: u64,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 30_000,
            max_step_timeout_ms: 300_000,
            default_max_retries: 3,
            retry_backoff_ms: 100,
            max_retry_backoff_ms: 5_000,
        }
    }
}

impl SagaConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }

    pub fn max_step_timeout(&self) -> Duration {
        Duration::from_millis(self.max_step_timeout_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.default_step_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "saga.default_step_timeout_ms",
                0,
                "step timeout must be positive",
            ));
        }
        if self.max_step_timeout_ms < self.default_step_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "saga.max_step_timeout_ms",
                self.max_step_timeout_ms,
                "must be at least default_step_timeout_ms",
            ));
        }
        Ok(())
    }
}

/// Pipeline runner defaults applied to the reference stage list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_max_retries: u32,
    pub default_backoff_ms: u64,
    pub default_exponential_base: f64,
    /// Per-stage timeout overrides keyed by stage name
    pub stage_timeouts_ms: HashMap<String, u64>,
    /// Fraction of the timeout above which a stage is reported as slow
    pub slow_stage_ratio: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use crate::constants::stages;

        let stage_timeouts_ms = [
            (stages::TREND_ANALYSIS, 30_000),
            (stages::CONTENT_CREATION, 60_000),
            (stages::VIDEO_PRODUCTION, 120_000),
            (stages::PUBLISHING, 30_000),
        ]
        .into_iter()
        .map(|(name, ms)| (name.to_string(), ms))
        .collect();

        Self {
            default_max_retries: 2,
            default_backoff_ms: 1_000,
            default_exponential_base: 2.0,
            stage_timeouts_ms,
            slow_stage_ratio: 0.8,
        }
    }
}

impl PipelineConfig {
    /// Timeout for a named stage, falling back to `fallback_ms`
    pub fn stage_timeout(&self, stage: &str, fallback_ms: u64) -> Duration {
        Duration::from_millis(
            self.stage_timeouts_ms
                .get(stage)
                .copied()
                .unwrap_or(fallback_ms),
        )
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.default_exponential_base < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "pipeline.default_exponential_base",
                self.default_exponential_base,
                "backoff must not shrink between attempts",
            ));
        }
        if let Some((stage, _)) = self.stage_timeouts_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(ConfigurationError::invalid_value(
                format!("pipeline.stage_timeouts_ms.{stage}"),
                0,
                "stage timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Heartbeat monitor thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub degraded_response_time_ms: f64,
    pub unhealthy_response_time_ms: f64,
    pub degraded_success_rate: f64,
    pub unhealthy_success_rate: f64,
    pub degraded_error_rate: f64,
    pub unhealthy_error_rate: f64,
    /// Silence after which an agent is considered offline
    pub offline_after_seconds: u64,
    pub sweep_interval_seconds: u64,
    /// How long resolved alerts are kept before collection
    pub alert_retention_seconds: u64,
    pub history_size: usize,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            degraded_response_time_ms: 2_000.0,
            unhealthy_response_time_ms: 5_000.0,
            degraded_success_rate: 0.9,
            unhealthy_success_rate: 0.7,
            degraded_error_rate: 0.1,
            unhealthy_error_rate: 0.3,
            offline_after_seconds: 60,
            sweep_interval_seconds: 30,
            alert_retention_seconds: 24 * 60 * 60,
            history_size: 100,
        }
    }
}

impl HeartbeatConfig {
    pub fn offline_after(&self) -> Duration {
        Duration::from_secs(self.offline_after_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn alert_retention(&self) -> Duration {
        Duration::from_secs(self.alert_retention_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "heartbeat.sweep_interval_seconds",
                0,
                "sweep interval must be positive",
            ));
        }
        if self.unhealthy_response_time_ms < self.degraded_response_time_ms {
            return Err(ConfigurationError::invalid_value(
                "heartbeat.unhealthy_response_time_ms",
                self.unhealthy_response_time_ms,
                "must be at least degraded_response_time_ms",
            ));
        }
        if self.unhealthy_success_rate > self.degraded_success_rate {
            return Err(ConfigurationError::invalid_value(
                "heartbeat.unhealthy_success_rate",
                self.unhealthy_success_rate,
                "must not exceed degraded_success_rate",
            ));
        }
        Ok(())
    }
}

/// Logging output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; derived from the environment when absent
    pub level: Option<String>,
    pub json: bool,
    pub ansi: bool,
    pub thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json: false,
            ansi: true,
            thread_ids: false,
        }
    }
}
