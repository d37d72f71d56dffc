//! # Error Types
//!
//! Error taxonomy for the orchestration core.
//!
//! Step- and stage-level failures are caught and classified where they happen
//! (see [`crate::resilience::error_classifier`]); only the terminal outcome of a
//! saga or pipeline reaches the caller, and it does so inside a typed result whose
//! `status` field is the primary signal.

use crate::config::ConfigurationError;
use crate::events::transport::TransportError;
use crate::state_machine::errors::StateMachineError;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Malformed planner input. Fails fast and is never retried.
    #[error("Validation error on '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// An action or stage failed but may succeed on retry.
    #[error("Transient execution error in {operation}: {reason}")]
    TransientExecution { operation: String, reason: String },

    /// Auth, permission or invalid-input class failure. Aborts the enclosing workflow.
    #[error("Critical execution error in {operation}: {reason}")]
    CriticalExecution { operation: String, reason: String },

    /// An action or stage exceeded its allotted time.
    #[error("Operation {operation} timed out after {}ms", timeout.as_millis())]
    Timeout { operation: String, timeout: Duration },

    /// A compensating action failed. Logged, never escalated.
    #[error("Compensation failed for step {step}: {reason}")]
    Compensation { step: String, reason: String },

    #[error("Plan dependency graph contains a cycle through actions {actions:?}")]
    CyclicDependency { actions: Vec<String> },

    #[error("Action {action} depends on unknown action {dependency}")]
    UnknownDependency { action: String, dependency: String },

    #[error("No capability provider registered for {capability}")]
    MissingCapability { capability: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Event error: {0}")]
    Event(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the class that must never be retried
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::CriticalExecution { .. }
                | Self::MissingCapability { .. }
                | Self::CyclicDependency { .. }
                | Self::UnknownDependency { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ConfigurationError> for CoreError {
    fn from(err: ConfigurationError) -> Self {
        CoreError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Validation {
            field: "payload".to_string(),
            reason: format!("JSON serialization error: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
