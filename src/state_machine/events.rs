use serde::{Deserialize, Serialize};

/// Events that can trigger saga status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Begin running steps
    Start,
    /// Every step completed
    Complete,
    /// A step failed for good; undo completed steps
    BeginCompensation(String),
    /// Compensation pass finished (whatever its outcome)
    FinishCompensation,
    /// The saga could not run at all
    Fail(String),
}

impl SagaEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::BeginCompensation(_) => "begin_compensation",
            Self::FinishCompensation => "finish_compensation",
            Self::Fail(_) => "fail",
        }
    }
}

/// Events that can trigger pipeline status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    Start,
    /// All stages were visited; the outcome depends on how many completed
    Finish { completed: usize, total: usize },
    Abort(String),
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Finish { .. } => "finish",
            Self::Abort(_) => "abort",
        }
    }
}
