//! # Saga Model
//!
//! Serializable record of a saga run. The executable closures live in the saga
//! executor; this record is what gets stored and returned to callers.

use super::plan::Action;
use crate::state_machine::{SagaStatus, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of the compensation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStatus {
    /// The saga never needed to compensate
    #[default]
    NotRequired,
    /// The saga failed before compensation could begin
    NotStarted,
    /// Every completed step was undone
    Compensated,
    /// At least one compensation failed
    PartiallyCompensated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStepRecord {
    pub action: Action,
    pub status: StepStatus,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Total invocations of the action, retries included
    pub attempts: u32,
    pub has_compensation: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SagaStepRecord {
    pub fn new(
        action: Action,
        timeout: Duration,
        max_retries: u32,
        has_compensation: bool,
    ) -> Self {
        Self {
            action,
            status: StepStatus::Pending,
            timeout_ms: timeout.as_millis() as u64,
            retry_count: 0,
            max_retries,
            attempts: 0,
            has_compensation,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn name(&self) -> &str {
        self.action.action_type.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaTransition {
    pub from: SagaStatus,
    pub to: SagaStatus,
    /// `current_index` at the moment of the transition
    pub index: usize,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saga {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub tenant_id: String,
    pub session_id: String,
    pub steps: Vec<SagaStepRecord>,
    pub current_index: usize,
    pub status: SagaStatus,
    pub compensation: CompensationStatus,
    pub compensation_errors: Vec<String>,
    pub transitions: Vec<SagaTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Saga {
    pub fn new(
        plan_id: Uuid,
        tenant_id: &str,
        session_id: &str,
        steps: Vec<SagaStepRecord>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plan_id,
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            steps,
            current_index: 0,
            status: SagaStatus::Pending,
            compensation: CompensationStatus::NotRequired,
            compensation_errors: Vec::new(),
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn record_transition(&mut self, to: SagaStatus, reason: Option<String>) {
        let now = Utc::now();
        self.transitions.push(SagaTransition {
            from: self.status,
            to,
            index: self.current_index,
            reason,
            at: now,
        });
        self.status = to;
        self.updated_at = now;
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }
}

/// Saga counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStats {
    pub total: usize,
    pub pending: usize,
    pub executing: usize,
    pub compensating: usize,
    pub completed: usize,
    pub failed: usize,
}

impl SagaStats {
    pub fn record(&mut self, status: SagaStatus) {
        self.total += 1;
        match status {
            SagaStatus::Pending => self.pending += 1,
            SagaStatus::Executing => self.executing += 1,
            SagaStatus::Compensating => self.compensating += 1,
            SagaStatus::Completed => self.completed += 1,
            SagaStatus::Failed => self.failed += 1,
        }
    }
}
