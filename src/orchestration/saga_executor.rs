//! # Saga Executor
//!
//! Runs a plan as a saga: every action becomes a compensatable step, steps run
//! strictly in plan order with per-step retry, and an unrecoverable failure
//! triggers best-effort compensation of the completed steps in reverse order.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──start──▶ executing ──all steps ok──▶ completed
//!    │                   │
//!    │ unbound action    │ step exhausted / critical
//!    ▼                   ▼
//!  failed ◀──finish── compensating
//! ```
//!
//! ## Step execution
//!
//! - Each attempt races the step action against its timeout.
//! - A transient failure or timeout is retried while `retry_count < max_retries`,
//!   sleeping `retry_backoff_ms * 2^(retry-1)` (capped) between attempts, so the
//!   action runs at most `max_retries + 1` times.
//! - A critical failure skips the remaining retries.
//! - Compensation failures are logged and collected in
//!   [`Saga::compensation_errors`]; they never stop earlier steps from being
//!   compensated and never escalate.
//!
//! `current_index` only moves forward while executing and only backward while
//! compensating.

use super::capability::{CapabilityProvider, CapabilityRegistry, CapabilityRequest};
use super::progress::ProgressNotes;
use crate::config::SagaConfig;
use crate::constants::events as event_names;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventDraft};
use crate::logging::{log_error, log_saga_operation};
use crate::models::{
    Action, ActionStatus, CompensationStatus, Plan, Saga, SagaStats, SagaStepRecord,
};
use crate::resilience::{
    BackoffCalculator, BackoffCalculatorConfig, ErrorClassifier, ExternalError,
    StandardErrorClassifier,
};
use crate::state_machine::{SagaEvent, SagaStateMachine, StepStatus};
use crate::store::{ContextStore, KeyValueStore};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub type StepFuture = BoxFuture<'static, std::result::Result<Value, ExternalError>>;
pub type CompensationFuture = BoxFuture<'static, std::result::Result<(), ExternalError>>;

type StepAction = Box<dyn Fn(u32) -> StepFuture + Send + Sync>;
type StepCompensation = Box<dyn Fn(Value) -> CompensationFuture + Send + Sync>;

/// One executable saga step: the bound action, its optional compensation and
/// its retry budget
pub struct SagaStep {
    name: String,
    action: StepAction,
    compensation: Option<StepCompensation>,
    timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("compensates", &self.compensation.is_some())
            .finish()
    }
}

impl SagaStep {
    /// Bind a provider to one action invocation
    pub fn bind(
        provider: Arc<dyn CapabilityProvider>,
        request: CapabilityRequest,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let name = request.operation.clone();

        let execute_provider = Arc::clone(&provider);
        let execute_request = request.clone();
        let action: StepAction = Box::new(move |attempt| {
            let provider = Arc::clone(&execute_provider);
            let request = execute_request.clone().with_attempt(attempt);
            async move { provider.execute(&request).await }.boxed()
        });

        let compensation: Option<StepCompensation> = if provider.supports_compensation() {
            Some(Box::new(move |output| {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.compensate(&request, &output).await }.boxed()
            }))
        } else {
            None
        };

        Self {
            name,
            action,
            compensation,
            timeout,
            max_retries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }
}

/// Executes plans as compensating sagas
pub struct SagaExecutor {
    config: SagaConfig,
    registry: CapabilityRegistry,
    sagas: Arc<dyn KeyValueStore<Uuid, Saga>>,
    notes: ProgressNotes,
    event_bus: EventBus,
    classifier: Arc<dyn ErrorClassifier>,
    backoff: BackoffCalculator,
}

impl SagaExecutor {
    pub fn new(
        config: SagaConfig,
        registry: CapabilityRegistry,
        sagas: Arc<dyn KeyValueStore<Uuid, Saga>>,
        context_store: Arc<dyn ContextStore>,
        event_bus: EventBus,
    ) -> Self {
        let backoff = BackoffCalculator::new(BackoffCalculatorConfig::from(&config));
        Self {
            config,
            registry,
            sagas,
            notes: ProgressNotes::new(context_store, "saga_executor"),
            event_bus,
            classifier: Arc::new(StandardErrorClassifier::new()),
            backoff,
        }
    }

    /// Replace the default message-marker classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Turn `plan` into a saga, run it to a terminal state and return the record
    ///
    /// Step failures never surface as `Err`; they end in a `failed` saga whose
    /// `error` carries the originating message. `Err` is reserved for input that
    /// cannot be run at all.
    #[instrument(skip(self, plan), fields(plan_id = %plan.id))]
    pub async fn create_and_execute_saga(
        &self,
        plan: &Plan,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Saga> {
        if !plan.is_dependency_ordered() {
            return Err(CoreError::validation(
                "plan.actions",
                "actions must be ordered so dependencies come first",
            ));
        }

        let mut records = Vec::with_capacity(plan.actions.len());
        let mut steps = Vec::with_capacity(plan.actions.len());
        let mut unbound: Option<String> = None;

        for action in &plan.actions {
            let key = action.action_type.as_str();
            let timeout = self.step_timeout(action);
            let max_retries = self.step_max_retries(action);

            match self.registry.get(key) {
                Some(provider) => {
                    let request = CapabilityRequest::new(
                        tenant_id,
                        session_id,
                        key,
                        action.parameters.clone(),
                    );
                    let step = SagaStep::bind(provider, request, timeout, max_retries);
                    records.push(SagaStepRecord::new(
                        action.clone(),
                        timeout,
                        max_retries,
                        step.has_compensation(),
                    ));
                    steps.push(step);
                }
                None => {
                    records.push(SagaStepRecord::new(action.clone(), timeout, max_retries, false));
                    unbound.get_or_insert_with(|| key.to_string());
                }
            }
        }

        let saga = Saga::new(plan.id, tenant_id, session_id, records);
        self.notes.open_session(tenant_id, session_id).await;
        self.persist(&saga).await;
        self.emit(&saga, event_names::SAGA_CREATED, json!({ "steps": saga.steps.len() }))
            .await;

        match unbound {
            Some(capability) => {
                self.fail_unbound(saga, CoreError::MissingCapability { capability })
                    .await
            }
            None => self.run(saga, steps).await,
        }
    }

    pub async fn get_saga_status(&self, saga_id: Uuid) -> Result<Option<Saga>> {
        Ok(self.sagas.get(&saga_id).await?)
    }

    /// Sagas for one tenant, oldest first
    pub async fn get_tenant_sagas(&self, tenant_id: &str) -> Result<Vec<Saga>> {
        let tenant = tenant_id.to_string();
        let filter = move |saga: &Saga| saga.tenant_id == tenant;
        let mut sagas = self.sagas.scan(&filter).await?;
        sagas.sort_by_key(|saga| saga.created_at);
        Ok(sagas)
    }

    pub async fn get_saga_stats(&self) -> Result<SagaStats> {
        let all = |_: &Saga| true;
        let sagas = self.sagas.scan(&all).await?;
        let mut stats = SagaStats::default();
        for saga in &sagas {
            stats.record(saga.status);
        }
        Ok(stats)
    }

    fn step_timeout(&self, action: &Action) -> Duration {
        let max_ms = self.config.max_step_timeout_ms;
        if let Some(ms) = action.parameters.get("timeoutMs").and_then(Value::as_u64) {
            return Duration::from_millis(ms.min(max_ms));
        }
        if action.estimated_duration_ms == 0 {
            return self.config.default_step_timeout();
        }
        Duration::from_millis(action.estimated_duration_ms.min(max_ms))
    }

    fn step_max_retries(&self, action: &Action) -> u32 {
        action
            .parameters
            .get("maxRetries")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(self.config.default_max_retries)
    }

    async fn fail_unbound(&self, mut saga: Saga, error: CoreError) -> Result<Saga> {
        let message = error.to_string();
        let mut machine = SagaStateMachine::new();
        let status = machine.transition(&SagaEvent::Fail(message.clone()))?;
        saga.record_transition(status, Some(message.clone()));
        saga.compensation = CompensationStatus::NotStarted;
        saga.error = Some(message.clone());

        log_saga_operation(
            "bind",
            Some(&saga.id.to_string()),
            Some(&saga.tenant_id),
            None,
            "failed",
            Some(&message),
        );
        self.persist(&saga).await;
        self.emit(
            &saga,
            event_names::SAGA_FAILED,
            json!({ "error": message, "compensation": saga.compensation }),
        )
        .await;
        self.notes
            .note(
                &saga.tenant_id,
                &saga.session_id,
                format!("Saga could not start: {message}"),
                json!({ "sagaId": saga.id }),
            )
            .await;
        Ok(saga)
    }

    async fn run(&self, mut saga: Saga, steps: Vec<SagaStep>) -> Result<Saga> {
        let mut machine = SagaStateMachine::new();
        let status = machine.transition(&SagaEvent::Start)?;
        saga.record_transition(status, None);
        self.persist(&saga).await;
        self.emit(&saga, event_names::SAGA_STARTED, json!({})).await;

        let saga_id = saga.id.to_string();
        log_saga_operation(
            "start",
            Some(&saga_id),
            Some(&saga.tenant_id),
            Some(0),
            "executing",
            None,
        );

        for (index, step) in steps.iter().enumerate() {
            saga.current_index = index;

            match self.execute_step(&mut saga, index, step).await {
                Ok(output) => {
                    let record = &mut saga.steps[index];
                    record.status = StepStatus::Completed;
                    record.retry_count = 0;
                    record.error = None;
                    record.result = Some(output.clone());
                    record.completed_at = Some(Utc::now());
                    record.action.status = ActionStatus::Completed;
                    record.action.result = Some(output);
                    let attempts = record.attempts;
                    saga.updated_at = Utc::now();

                    self.persist(&saga).await;
                    self.emit(
                        &saga,
                        event_names::SAGA_STEP_COMPLETED,
                        json!({ "stepIndex": index, "step": step.name, "attempts": attempts }),
                    )
                    .await;
                    self.notes
                        .note(
                            &saga.tenant_id,
                            &saga.session_id,
                            format!("Completed {} ({}/{})", step.name, index + 1, steps.len()),
                            json!({ "sagaId": saga.id, "stepIndex": index }),
                        )
                        .await;
                    self.notes
                        .agent_state(
                            &saga.tenant_id,
                            &saga.session_id,
                            json!({
                                "sagaId": saga.id,
                                "status": saga.status,
                                "currentIndex": index,
                            }),
                        )
                        .await;
                }
                Err(error) => {
                    let message = error.to_string();
                    saga.error = Some(message.clone());

                    let status =
                        machine.transition(&SagaEvent::BeginCompensation(message.clone()))?;
                    saga.record_transition(status, Some(message.clone()));
                    self.persist(&saga).await;
                    self.emit(
                        &saga,
                        event_names::SAGA_COMPENSATION_STARTED,
                        json!({ "failedStep": index, "error": message }),
                    )
                    .await;

                    self.compensate(&mut saga, &steps, index).await;

                    let status = machine.transition(&SagaEvent::FinishCompensation)?;
                    saga.record_transition(status, Some(message.clone()));
                    self.persist(&saga).await;

                    error!(
                        saga_id = %saga.id,
                        failed_step = %step.name,
                        compensation = ?saga.compensation,
                        compensation_errors = saga.compensation_errors.len(),
                        error = %message,
                        "Saga failed"
                    );
                    self.emit(
                        &saga,
                        event_names::SAGA_FAILED,
                        json!({
                            "failedStep": index,
                            "error": message,
                            "compensation": saga.compensation,
                            "compensationErrors": saga.compensation_errors,
                        }),
                    )
                    .await;
                    self.notes
                        .agent_state(
                            &saga.tenant_id,
                            &saga.session_id,
                            json!({ "sagaId": saga.id, "status": saga.status, "error": message }),
                        )
                        .await;
                    return Ok(saga);
                }
            }
        }

        let status = machine.transition(&SagaEvent::Complete)?;
        saga.record_transition(status, None);
        self.persist(&saga).await;
        self.emit(&saga, event_names::SAGA_COMPLETED, json!({ "steps": saga.steps.len() }))
            .await;
        log_saga_operation(
            "complete",
            Some(&saga_id),
            Some(&saga.tenant_id),
            Some(saga.current_index),
            "completed",
            None,
        );
        Ok(saga)
    }

    async fn execute_step(
        &self,
        saga: &mut Saga,
        index: usize,
        step: &SagaStep,
    ) -> std::result::Result<Value, CoreError> {
        loop {
            let attempt = {
                let record = &mut saga.steps[index];
                record.attempts += 1;
                record.status = StepStatus::Executing;
                record.action.status = ActionStatus::InProgress;
                record.started_at.get_or_insert_with(Utc::now);
                record.attempts
            };
            self.emit(
                saga,
                event_names::SAGA_STEP_STARTED,
                json!({ "stepIndex": index, "step": step.name, "attempt": attempt }),
            )
            .await;
            debug!(saga_id = %saga.id, step = %step.name, attempt, "Running saga step");

            let error = match tokio::time::timeout(step.timeout, (step.action)(attempt)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(failure)) => self.classifier.classify_external(&step.name, &failure),
                Err(_) => CoreError::Timeout {
                    operation: step.name.clone(),
                    timeout: step.timeout,
                },
            };
            let category = self.classifier.category(&error);

            let record = &mut saga.steps[index];
            record.error = Some(error.to_string());

            if category.is_retryable() && record.retry_count < record.max_retries {
                record.retry_count += 1;
                let retry_count = record.retry_count;
                let delay = self.backoff.delay_for_attempt(retry_count);

                warn!(
                    saga_id = %saga.id,
                    step = %step.name,
                    retry_count,
                    max_retries = step.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying saga step"
                );
                self.persist(saga).await;
                self.emit(
                    saga,
                    event_names::SAGA_STEP_RETRYING,
                    json!({
                        "stepIndex": index,
                        "step": step.name,
                        "retryCount": retry_count,
                        "delayMs": delay.as_millis() as u64,
                        "category": category,
                        "error": error.to_string(),
                    }),
                )
                .await;
                tokio::time::sleep(delay).await;
                continue;
            }

            record.status = StepStatus::Failed;
            record.action.status = ActionStatus::Failed;
            record.completed_at = Some(Utc::now());
            let attempts = record.attempts;

            self.emit(
                saga,
                event_names::SAGA_STEP_FAILED,
                json!({
                    "stepIndex": index,
                    "step": step.name,
                    "attempts": attempts,
                    "category": category,
                    "error": error.to_string(),
                }),
            )
            .await;
            self.notes
                .note(
                    &saga.tenant_id,
                    &saga.session_id,
                    format!("Step {} failed after {attempts} attempt(s): {error}", step.name),
                    json!({ "sagaId": saga.id, "stepIndex": index }),
                )
                .await;
            return Err(error);
        }
    }

    /// Undo completed steps before `failed_index`, newest first
    async fn compensate(&self, saga: &mut Saga, steps: &[SagaStep], failed_index: usize) {
        let mut compensated = 0usize;
        let mut failed = 0usize;

        for index in (0..failed_index).rev() {
            saga.current_index = index;
            if !saga.steps[index].status.needs_compensation() {
                continue;
            }
            let step = &steps[index];
            let Some(compensation) = &step.compensation else {
                debug!(saga_id = %saga.id, step = %step.name, "Step has no compensation");
                continue;
            };

            let output = saga.steps[index].result.clone().unwrap_or(Value::Null);
            let failure = match tokio::time::timeout(step.timeout, compensation(output)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {}ms", step.timeout.as_millis())),
            };

            match failure {
                None => {
                    compensated += 1;
                    let record = &mut saga.steps[index];
                    record.status = StepStatus::Compensated;
                    record.action.status = ActionStatus::Compensated;
                    self.emit(
                        saga,
                        event_names::SAGA_STEP_COMPENSATED,
                        json!({ "stepIndex": index, "step": step.name }),
                    )
                    .await;
                }
                Some(reason) => {
                    failed += 1;
                    let error = CoreError::Compensation {
                        step: step.name.clone(),
                        reason,
                    };
                    log_error(
                        "saga_executor",
                        "compensate",
                        &error.to_string(),
                        Some(&saga.id.to_string()),
                    );
                    saga.compensation_errors.push(error.to_string());
                    saga.steps[index].status = StepStatus::CompensationFailed;
                    self.emit(
                        saga,
                        event_names::SAGA_STEP_COMPENSATION_FAILED,
                        json!({
                            "stepIndex": index,
                            "step": step.name,
                            "error": error.to_string(),
                        }),
                    )
                    .await;
                }
            }
            saga.updated_at = Utc::now();
            self.persist(saga).await;
        }

        saga.compensation = if failed > 0 {
            CompensationStatus::PartiallyCompensated
        } else if compensated > 0 {
            CompensationStatus::Compensated
        } else {
            CompensationStatus::NotRequired
        };

        info!(
            saga_id = %saga.id,
            compensated,
            failed,
            outcome = ?saga.compensation,
            "Compensation finished"
        );
        self.notes
            .note(
                &saga.tenant_id,
                &saga.session_id,
                format!("Compensated {compensated} step(s), {failed} compensation failure(s)"),
                json!({ "sagaId": saga.id }),
            )
            .await;
    }

    async fn persist(&self, saga: &Saga) {
        if let Err(e) = self.sagas.put(saga.id, saga.clone()).await {
            warn!(saga_id = %saga.id, error = %e, "Failed to persist saga");
        }
    }

    async fn emit(&self, saga: &Saga, event_type: &str, details: Value) {
        let mut payload = json!({
            "sagaId": saga.id,
            "planId": saga.plan_id,
            "status": saga.status,
            "currentIndex": saga.current_index,
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), details) {
            target.extend(extra);
        }
        let draft = EventDraft::new(event_type, &saga.tenant_id, &saga.session_id, payload)
            .with_correlation_id(saga.id.to_string());
        self.event_bus.publish_quietly(draft).await;
    }
}
