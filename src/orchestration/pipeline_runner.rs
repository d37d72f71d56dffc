//! # Pipeline Runner
//!
//! Executes a declarative stage list in order, one stage at a time.
//!
//! For each stage:
//!
//! 1. Skip it when a dependency has no recorded output.
//! 2. Map its input and attach the nearest earlier output under `previousStage`.
//! 3. Execute through the stage's capability provider, racing the stage timeout
//!    and retrying with `backoff_ms * exponential_base^attempt`.
//! 4. Record the mapped output and update the per-stage metrics.
//!
//! A stage that exhausts its retries aborts the run when it is the first stage or
//! its error is critical. Any other failure lets later independent stages run,
//! which is how a run ends in `partial_success`.

use super::capability::{CapabilityRegistry, CapabilityRequest};
use super::pipeline_definition::{PipelineDefinition, StageDefinition};
use super::progress::ProgressNotes;
use crate::config::PipelineConfig;
use crate::constants::{events as event_names, pipeline_keys};
use crate::error::{CoreError, Result};
use crate::events::{EventBus, EventDraft};
use crate::logging::log_pipeline_operation;
use crate::models::{
    PipelineExecution, PipelineMetrics, PipelineResult, StageMetrics, StageRecord, StageResult,
};
use crate::resilience::{stage_retry_delay, ErrorCategory, ErrorClassifier, StandardErrorClassifier};
use crate::state_machine::{PipelineEvent, PipelineStateMachine, PipelineStatus, StageStatus};
use crate::store::{ContextStore, KeyValueStore};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a stage gave up
#[derive(Debug)]
struct StageFailure {
    error: CoreError,
    category: ErrorCategory,
    timed_out: bool,
}

/// Runs pipelines and keeps cross-run stage metrics
pub struct PipelineRunner {
    config: PipelineConfig,
    registry: CapabilityRegistry,
    executions: Arc<dyn KeyValueStore<Uuid, PipelineExecution>>,
    notes: ProgressNotes,
    event_bus: EventBus,
    classifier: Arc<dyn ErrorClassifier>,
    viralization: PipelineDefinition,
    stage_metrics: DashMap<String, StageMetrics>,
    totals: Mutex<PipelineMetrics>,
}

impl PipelineRunner {
    pub fn new(
        config: PipelineConfig,
        registry: CapabilityRegistry,
        executions: Arc<dyn KeyValueStore<Uuid, PipelineExecution>>,
        context_store: Arc<dyn ContextStore>,
        event_bus: EventBus,
    ) -> Self {
        let viralization = PipelineDefinition::viralization(&config);
        Self {
            config,
            registry,
            executions,
            notes: ProgressNotes::new(context_store, "pipeline_runner"),
            event_bus,
            classifier: Arc::new(StandardErrorClassifier::new()),
            viralization,
            stage_metrics: DashMap::new(),
            totals: Mutex::new(PipelineMetrics::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// The reference definition used by [`Self::execute_viralization_pipeline`]
    pub fn viralization_definition(&self) -> &PipelineDefinition {
        &self.viralization
    }

    pub async fn execute_viralization_pipeline(
        &self,
        tenant_id: &str,
        session_id: &str,
        input_data: Value,
    ) -> Result<PipelineResult> {
        self.execute_pipeline(&self.viralization, tenant_id, session_id, input_data)
            .await
    }

    /// Run any stage list to completion
    ///
    /// Stage failures are reported through the result's `status`; `Err` means
    /// the definition itself is invalid.
    #[instrument(skip(self, definition, input_data), fields(pipeline = %definition.name))]
    pub async fn execute_pipeline(
        &self,
        definition: &PipelineDefinition,
        tenant_id: &str,
        session_id: &str,
        input_data: Value,
    ) -> Result<PipelineResult> {
        definition.validate()?;

        let started = Instant::now();
        let mut machine = PipelineStateMachine::new();
        let mut execution = PipelineExecution {
            id: Uuid::new_v4(),
            pipeline_name: definition.name.clone(),
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            stages: definition.stages.iter().map(stage_record).collect(),
            current_stage_index: 0,
            status: PipelineStatus::Pending,
            input_data,
            output_data: Map::new(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
        };
        let execution_id = execution.id.to_string();

        execution.status = machine.transition(&PipelineEvent::Start)?;
        self.notes.open_session(tenant_id, session_id).await;
        self.persist(&execution).await;
        self.emit(
            &execution,
            event_names::PIPELINE_STARTED,
            json!({ "totalStages": definition.stages.len() }),
        )
        .await;
        log_pipeline_operation("start", Some(&execution_id), None, "running", None, None);

        let mut aborted = false;
        for (index, stage) in definition.stages.iter().enumerate() {
            execution.current_stage_index = index;

            if let Some(missing) = stage
                .dependencies
                .iter()
                .find(|dependency| !execution.has_output(dependency))
            {
                let reason = format!("dependency {missing} produced no output");
                let record = &mut execution.stages[index];
                record.status = StageStatus::Skipped;
                record.error = Some(reason.clone());
                debug!(
                    execution_id = %execution.id,
                    stage = %stage.name,
                    %reason,
                    "Skipping stage"
                );
                self.emit(
                    &execution,
                    event_names::PIPELINE_STAGE_SKIPPED,
                    json!({ "stage": stage.name, "reason": reason }),
                )
                .await;
                continue;
            }

            let input = self.stage_input(&execution, index, stage);
            let stage_started = Instant::now();
            let outcome = self.run_stage(&mut execution, index, stage, input).await;
            let elapsed = stage_started.elapsed();

            let record = &mut execution.stages[index];
            record.completed_at = Some(Utc::now());
            record.duration_ms = Some(elapsed.as_millis() as u64);

            match outcome {
                Ok(raw) => {
                    let output = stage.map_output(raw);
                    record.status = StageStatus::Completed;
                    record.error = None;
                    execution.output_data.insert(stage.name.clone(), output);
                    self.stage_metrics
                        .entry(stage.name.clone())
                        .or_default()
                        .record_success(elapsed);

                    log_pipeline_operation(
                        "stage",
                        Some(&execution_id),
                        Some(&stage.name),
                        "completed",
                        Some(elapsed.as_millis() as u64),
                        None,
                    );
                    self.persist(&execution).await;
                    self.emit(
                        &execution,
                        event_names::PIPELINE_STAGE_COMPLETED,
                        json!({ "stage": stage.name, "durationMs": elapsed.as_millis() as u64 }),
                    )
                    .await;
                    self.notes
                        .note(
                            tenant_id,
                            session_id,
                            format!("Stage {} completed", stage.name),
                            json!({ "executionId": execution.id, "stage": stage.name }),
                        )
                        .await;
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    record.status = StageStatus::Failed;
                    record.timed_out = failure.timed_out;
                    record.error = Some(message.clone());
                    self.stage_metrics
                        .entry(stage.name.clone())
                        .or_default()
                        .record_failure(elapsed, failure.timed_out);

                    let abort = index == 0 || failure.category == ErrorCategory::Critical;
                    warn!(
                        execution_id = %execution.id,
                        stage = %stage.name,
                        category = %failure.category,
                        abort,
                        error = %message,
                        "Pipeline stage failed"
                    );
                    execution.error.get_or_insert_with(|| message.clone());
                    self.persist(&execution).await;
                    self.emit(
                        &execution,
                        event_names::PIPELINE_STAGE_FAILED,
                        json!({
                            "stage": stage.name,
                            "category": failure.category,
                            "timedOut": failure.timed_out,
                            "abort": abort,
                            "error": message,
                        }),
                    )
                    .await;
                    self.notes
                        .note(
                            tenant_id,
                            session_id,
                            format!("Stage {} failed: {message}", stage.name),
                            json!({ "executionId": execution.id, "stage": stage.name }),
                        )
                        .await;

                    if abort {
                        execution.status = machine.transition(&PipelineEvent::Abort(message))?;
                        aborted = true;
                        break;
                    }
                }
            }
        }

        if !aborted {
            execution.status = machine.transition(&PipelineEvent::Finish {
                completed: execution.stages_completed(),
                total: execution.stages.len(),
            })?;
        }
        execution.end_time = Some(Utc::now());
        self.persist(&execution).await;
        self.record_totals(execution.status);

        let total_duration_ms = started.elapsed().as_millis() as u64;
        let recommendations = self.recommendations(&execution);
        let result = PipelineResult {
            execution_id: execution.id,
            status: execution.status,
            stage_results: stage_results(&execution),
            stages_completed: execution.stages_completed(),
            total_stages: execution.stages.len(),
            total_duration_ms,
            output_data: Value::Object(execution.output_data.clone()),
            recommendations,
            error: execution.error.clone(),
        };

        let event_type = if result.status == PipelineStatus::Failed {
            event_names::PIPELINE_FAILED
        } else {
            event_names::PIPELINE_COMPLETED
        };
        self.emit(
            &execution,
            event_type,
            json!({
                "stagesCompleted": result.stages_completed,
                "totalStages": result.total_stages,
                "durationMs": total_duration_ms,
                "error": result.error,
            }),
        )
        .await;
        self.notes
            .agent_state(
                tenant_id,
                session_id,
                json!({
                    "executionId": execution.id,
                    "status": result.status,
                    "stagesCompleted": result.stages_completed,
                }),
            )
            .await;

        info!(
            execution_id = %execution.id,
            status = %result.status,
            stages_completed = result.stages_completed,
            total_stages = result.total_stages,
            duration_ms = total_duration_ms,
            "Pipeline finished"
        );
        Ok(result)
    }

    pub async fn get_pipeline_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<PipelineExecution>> {
        Ok(self.executions.get(&execution_id).await?)
    }

    /// Executions for one tenant, oldest first
    pub async fn get_tenant_executions(&self, tenant_id: &str) -> Result<Vec<PipelineExecution>> {
        let tenant = tenant_id.to_string();
        let filter = move |execution: &PipelineExecution| execution.tenant_id == tenant;
        let mut executions = self.executions.scan(&filter).await?;
        executions.sort_by_key(|execution| execution.start_time);
        Ok(executions)
    }

    pub fn get_pipeline_metrics(&self) -> PipelineMetrics {
        let mut metrics = self.totals.lock().clone();
        metrics.stages = self
            .stage_metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        metrics
    }

    fn stage_input(
        &self,
        execution: &PipelineExecution,
        index: usize,
        stage: &StageDefinition,
    ) -> Value {
        let previous = execution.stages[..index]
            .iter()
            .rev()
            .find(|record| record.status.satisfies_dependencies())
            .and_then(|record| execution.output_data.get(&record.name))
            .cloned()
            .unwrap_or(Value::Null);

        match stage.map_input(&execution.input_data, &execution.output_data) {
            Value::Object(mut fields) => {
                fields.insert(pipeline_keys::PREVIOUS_STAGE.to_string(), previous);
                Value::Object(fields)
            }
            other => {
                let mut fields = Map::new();
                fields.insert(pipeline_keys::INPUT.to_string(), other);
                fields.insert(pipeline_keys::PREVIOUS_STAGE.to_string(), previous);
                Value::Object(fields)
            }
        }
    }

    async fn run_stage(
        &self,
        execution: &mut PipelineExecution,
        index: usize,
        stage: &StageDefinition,
        input: Value,
    ) -> std::result::Result<Value, StageFailure> {
        let Some(provider) = self.registry.get(&stage.capability) else {
            return Err(StageFailure {
                error: CoreError::MissingCapability {
                    capability: stage.capability.clone(),
                },
                category: ErrorCategory::Critical,
                timed_out: false,
            });
        };
        let retry = &stage.retry_config;
        let mut attempt: u32 = 0;

        loop {
            {
                let record = &mut execution.stages[index];
                record.attempts += 1;
                record.status = StageStatus::Running;
                record.started_at.get_or_insert_with(Utc::now);
            }
            self.emit(
                execution,
                event_names::PIPELINE_STAGE_STARTED,
                json!({ "stage": stage.name, "attempt": attempt + 1 }),
            )
            .await;

            let request = CapabilityRequest::new(
                execution.tenant_id.as_str(),
                execution.session_id.as_str(),
                stage.name.as_str(),
                input.clone(),
            )
            .with_attempt(attempt + 1);

            let (error, timed_out) =
                match tokio::time::timeout(stage.timeout, provider.execute(&request)).await {
                    Ok(Ok(output)) => return Ok(output),
                    Ok(Err(failure)) => (
                        self.classifier.classify_external(&stage.name, &failure),
                        false,
                    ),
                    Err(_) => (
                        CoreError::Timeout {
                            operation: stage.name.clone(),
                            timeout: stage.timeout,
                        },
                        true,
                    ),
                };
            let category = self.classifier.category(&error);

            if !category.is_retryable() || attempt >= retry.max_retries {
                return Err(StageFailure {
                    error,
                    category,
                    timed_out,
                });
            }

            let delay = stage_retry_delay(retry.backoff_ms, retry.exponential_base, attempt);
            attempt += 1;
            debug!(
                execution_id = %execution.id,
                stage = %stage.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying pipeline stage"
            );
            self.emit(
                execution,
                event_names::PIPELINE_STAGE_RETRYING,
                json!({
                    "stage": stage.name,
                    "retry": attempt,
                    "delayMs": delay.as_millis() as u64,
                    "timedOut": timed_out,
                    "error": error.to_string(),
                }),
            )
            .await;
            tokio::time::sleep(delay).await;
        }
    }

    fn recommendations(&self, execution: &PipelineExecution) -> Vec<String> {
        let mut recommendations = Vec::new();
        for record in &execution.stages {
            match record.status {
                StageStatus::Failed if record.timed_out => recommendations.push(format!(
                    "Increase the timeout for {} (exceeded {}ms on every attempt)",
                    record.name, record.timeout_ms
                )),
                StageStatus::Failed => recommendations.push(format!(
                    "Review {}: {}",
                    record.name,
                    record.error.as_deref().unwrap_or("unknown error")
                )),
                StageStatus::Completed => {
                    let threshold = record.timeout_ms as f64 * self.config.slow_stage_ratio;
                    if let Some(duration) = record.duration_ms.filter(|ms| *ms as f64 > threshold) {
                        recommendations.push(format!(
                            "Optimize {}: took {duration}ms of its {}ms budget",
                            record.name, record.timeout_ms
                        ));
                    }
                }
                _ => {}
            }
        }
        if execution.status == PipelineStatus::Success {
            recommendations.push("Content is ready for distribution".to_string());
        }
        recommendations
    }

    fn record_totals(&self, status: PipelineStatus) {
        let mut totals = self.totals.lock();
        totals.total_executions += 1;
        match status {
            PipelineStatus::Success => totals.successful += 1,
            PipelineStatus::PartialSuccess => totals.partial += 1,
            PipelineStatus::Failed => totals.failed += 1,
            PipelineStatus::Pending | PipelineStatus::Running => {}
        }
    }

    async fn persist(&self, execution: &PipelineExecution) {
        if let Err(e) = self.executions.put(execution.id, execution.clone()).await {
            warn!(execution_id = %execution.id, error = %e, "Failed to persist pipeline execution");
        }
    }

    async fn emit(&self, execution: &PipelineExecution, event_type: &str, details: Value) {
        let mut payload = json!({
            "executionId": execution.id,
            "pipeline": execution.pipeline_name,
            "status": execution.status,
            "stageIndex": execution.current_stage_index,
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), details) {
            target.extend(extra);
        }
        let draft = EventDraft::new(
            event_type,
            &execution.tenant_id,
            &execution.session_id,
            payload,
        )
        .with_correlation_id(execution.id.to_string());
        self.event_bus.publish_quietly(draft).await;
    }
}

fn stage_record(stage: &StageDefinition) -> StageRecord {
    StageRecord {
        name: stage.name.clone(),
        status: StageStatus::Pending,
        dependencies: stage.dependencies.clone(),
        timeout_ms: stage.timeout.as_millis() as u64,
        retry_config: stage.retry_config.clone(),
        attempts: 0,
        timed_out: false,
        started_at: None,
        completed_at: None,
        duration_ms: None,
        error: None,
    }
}

fn stage_results(execution: &PipelineExecution) -> Vec<StageResult> {
    execution
        .stages
        .iter()
        .map(|record| StageResult {
            stage: record.name.clone(),
            status: record.status,
            attempts: record.attempts,
            duration_ms: record.duration_ms,
            timed_out: record.timed_out,
            output: execution.output_data.get(&record.name).cloned(),
            error: record.error.clone(),
        })
        .collect()
}
