//! # Backoff Calculator
//!
//! Retry delay calculations shared by the event bus, the saga executor and the
//! pipeline runner.
//!
//! - Event redelivery: `base * 2^(attempt-1) + jitter`, capped (30s by default).
//! - Saga step retry: `base * 2^(retry-1)`, capped, no jitter.
//! - Pipeline stage retry: `backoff_ms * exponential_base^attempt` with a 0-based
//!   attempt index.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for exponential backoff with optional jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffCalculatorConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter; 0 disables it
    pub max_jitter_ms: u64,
}

impl Default for BackoffCalculatorConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: crate::constants::system::MAX_EVENT_BACKOFF_MS,
            max_jitter_ms: 1_000,
        }
    }
}

impl From<&crate::config::EventBusConfig> for BackoffCalculatorConfig {
    fn from(config: &crate::config::EventBusConfig) -> Self {
        Self {
            base_delay_ms: config.base_backoff_ms,
            max_delay_ms: config.max_backoff_ms,
            max_jitter_ms: config.max_jitter_ms,
        }
    }
}

impl From<&crate::config::SagaConfig> for BackoffCalculatorConfig {
    fn from(config: &crate::config::SagaConfig) -> Self {
        Self {
            base_delay_ms: config.retry_backoff_ms,
            max_delay_ms: config.max_retry_backoff_ms,
            max_jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffCalculatorConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffCalculatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffCalculatorConfig {
        &self.config
    }

    /// Delay before retry number `attempt` (1-based), with random jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.config.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.config.max_jitter_ms)
        };
        self.delay_with_jitter(attempt, jitter_ms)
    }

    /// Deterministic form of [`Self::delay_for_attempt`]
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let exponential = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exponent);
        let total = exponential.saturating_add(jitter_ms);
        Duration::from_millis(total.min(self.config.max_delay_ms))
    }
}

/// Stage retry delay: `backoff_ms * exponential_base^attempt`
pub fn stage_retry_delay(backoff_ms: u64, exponential_base: f64, attempt: u32) -> Duration {
    let factor = exponential_base.powi(attempt.min(i32::MAX as u32) as i32);
    let millis = (backoff_ms as f64 * factor).min(u64::MAX as f64);
    Duration::from_millis(millis as u64)
}
