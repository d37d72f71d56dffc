//! # Error Classification
//!
//! Turns raw collaborator failures into the core error taxonomy and decides
//! whether a failure may be retried.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ ExternalError   │────▶│ ErrorClassifier │────▶│ CoreError +     │
//! │ + operation     │     │                 │     │ ErrorCategory   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Classification is a pure function of the error, so replaying the same failure
//! always lands in the same category.

use super::failure::ExternalError;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Retry-relevant error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// May succeed on retry
    Transient,
    /// Exceeded its time budget; retried like a transient error
    Timeout,
    /// Auth, permission or invalid input; never retried
    Critical,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Critical)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Critical => write!(f, "critical"),
        }
    }
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    /// Convert a collaborator failure during `operation` into a core error
    fn classify_external(&self, operation: &str, error: &ExternalError) -> CoreError;

    /// Category of an already-classified core error
    fn category(&self, error: &CoreError) -> ErrorCategory {
        if error.is_timeout() {
            ErrorCategory::Timeout
        } else if error.is_critical() {
            ErrorCategory::Critical
        } else {
            ErrorCategory::Transient
        }
    }

    fn classifier_name(&self) -> &'static str;
}

/// Message-marker based classifier used when collaborators give no explicit hint
#[derive(Debug, Clone)]
pub struct StandardErrorClassifier {
    critical_markers: Vec<String>,
}

impl Default for StandardErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardErrorClassifier {
    pub fn new() -> Self {
        let critical_markers = [
            "unauthorized",
            "unauthenticated",
            "authentication",
            "forbidden",
            "permission denied",
            "access denied",
            "invalid input",
            "invalid_input",
            "invalid credentials",
            "token expired",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self { critical_markers }
    }

    /// Add extra lowercase markers that flag a message as critical
    pub fn with_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_markers
            .extend(markers.into_iter().map(|m| m.into().to_lowercase()));
        self
    }

    fn message_is_critical(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.critical_markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_external(&self, operation: &str, error: &ExternalError) -> CoreError {
        let critical = match error {
            ExternalError::Critical(_) => true,
            ExternalError::Transient(_) => false,
            ExternalError::Unclassified(message) => self.message_is_critical(message),
        };

        if critical {
            CoreError::CriticalExecution {
                operation: operation.to_string(),
                reason: error.message().to_string(),
            }
        } else {
            CoreError::TransientExecution {
                operation: operation.to_string(),
                reason: error.message().to_string(),
            }
        }
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}
