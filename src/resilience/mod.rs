//! # Resilience Module
//!
//! Retry support shared by the event bus, saga executor and pipeline runner:
//!
//! - **Backoff**: exponential delays with optional jitter and caps
//! - **Classification**: transient vs. timeout vs. critical failures
//! - **External errors**: the error type collaborators raise before classification

pub mod backoff;
pub mod error_classifier;
pub mod failure;

pub use backoff::{stage_retry_delay, BackoffCalculator, BackoffCalculatorConfig};
pub use error_classifier::{ErrorCategory, ErrorClassifier, StandardErrorClassifier};
pub use failure::ExternalError;
