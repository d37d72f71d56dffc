//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orchestration core. Sagas and
//! pipelines interleave on the runtime, so every log line carries tenant, session
//! and workflow identifiers as structured fields rather than formatted text.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber, and an
/// already-installed global subscriber is left in place.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment));

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let fmt_layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(config.thread_ids)
                .with_level(true)
                .with_ansi(config.ansi)
                .boxed()
        };

        if tracing_subscriber::registry()
            .with(fmt_layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            level = %log_level,
            json = config.json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("VIRALIZE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for saga operations
pub fn log_saga_operation(
    operation: &str,
    saga_id: Option<&str>,
    tenant_id: Option<&str>,
    step_index: Option<usize>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        saga_id = saga_id,
        tenant_id = tenant_id,
        step_index = step_index,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "SAGA_OPERATION"
    );
}

/// Log structured data for pipeline operations
pub fn log_pipeline_operation(
    operation: &str,
    execution_id: Option<&str>,
    stage: Option<&str>,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = execution_id,
        stage = stage,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "PIPELINE_OPERATION"
    );
}

/// Log structured data for event bus operations
pub fn log_event_operation(
    operation: &str,
    event_id: Option<&str>,
    channel: Option<&str>,
    retry_count: Option<u32>,
    status: &str,
) {
    tracing::debug!(
        operation = %operation,
        event_id = event_id,
        channel = channel,
        retry_count = retry_count,
        status = %status,
        "EVENT_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
