//! Declarative pipeline definitions.
//!
//! A [`PipelineDefinition`] is an ordered stage list. Each stage names the
//! capability that runs it, the stages whose output it needs, its own timeout and
//! retry policy, and the mappers that shape its input and output.

use crate::config::PipelineConfig;
use crate::constants::stages;
use crate::error::{CoreError, Result};
use crate::models::RetryConfig;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builds stage input from the pipeline input and the outputs recorded so far
pub type InputMapper = Arc<dyn Fn(&Value, &Map<String, Value>) -> Value + Send + Sync>;
/// Shapes a provider's raw result before it is recorded
pub type OutputMapper = Arc<dyn Fn(Value) -> Value + Send + Sync>;

const DEFAULT_STAGE_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone)]
pub struct StageDefinition {
    pub name: String,
    /// Registry key of the provider that executes the stage
    pub capability: String,
    pub dependencies: Vec<String>,
    pub timeout: Duration,
    pub retry_config: RetryConfig,
    input_mapper: InputMapper,
    output_mapper: OutputMapper,
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

impl StageDefinition {
    /// Stage executed by the capability of the same name, passing the pipeline
    /// input through unchanged
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            capability: name.clone(),
            name,
            dependencies: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_STAGE_TIMEOUT_MS),
            retry_config: RetryConfig::default(),
            input_mapper: Arc::new(|input, _| input.clone()),
            output_mapper: Arc::new(|output| output),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    pub fn depends_on(mut self, stage: impl Into<String>) -> Self {
        self.dependencies.push(stage.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_input_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.input_mapper = Arc::new(mapper);
        self
    }

    pub fn with_output_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.output_mapper = Arc::new(mapper);
        self
    }

    pub fn map_input(&self, input: &Value, outputs: &Map<String, Value>) -> Value {
        (self.input_mapper)(input, outputs)
    }

    pub fn map_output(&self, output: Value) -> Value {
        (self.output_mapper)(output)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Stage names must be unique and every dependency must name an earlier stage
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(CoreError::validation(
                "pipeline.stages",
                format!("pipeline {} has no stages", self.name),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if let Some(missing) = stage
                .dependencies
                .iter()
                .find(|dependency| !seen.contains(dependency.as_str()))
            {
                return Err(CoreError::validation(
                    format!("pipeline.stages.{}", stage.name),
                    format!("dependency {missing} is not an earlier stage"),
                ));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(CoreError::validation(
                    "pipeline.stages",
                    format!("duplicate stage {}", stage.name),
                ));
            }
        }
        Ok(())
    }

    /// Reference flow: trend analysis, content creation, video production, publishing
    pub fn viralization(config: &PipelineConfig) -> Self {
        let retry = RetryConfig::from(config);
        let stage = |name: &str| {
            StageDefinition::new(name)
                .with_timeout(config.stage_timeout(name, DEFAULT_STAGE_TIMEOUT_MS))
                .with_retry_config(retry.clone())
        };

        Self::new("viralization")
            .with_stage(stage(stages::TREND_ANALYSIS).with_input_mapper(|input, _| {
                json!({
                    "platform": field_or(input, "platform", Value::Null),
                    "topics": field_or(input, "topics", json!([])),
                    "audience": field_or(input, "audience", Value::Null),
                })
            }))
            .with_stage(
                stage(stages::CONTENT_CREATION)
                    .depends_on(stages::TREND_ANALYSIS)
                    .with_input_mapper(|input, outputs| {
                        json!({
                            "trends": stage_output(outputs, stages::TREND_ANALYSIS),
                            "brief": field_or(input, "brief", Value::Null),
                            "contentTypes": field_or(input, "contentTypes", json!([])),
                        })
                    }),
            )
            .with_stage(
                stage(stages::VIDEO_PRODUCTION)
                    .depends_on(stages::CONTENT_CREATION)
                    .with_input_mapper(|input, outputs| {
                        json!({
                            "content": stage_output(outputs, stages::CONTENT_CREATION),
                            "format": field_or(input, "videoFormat", json!("short_video")),
                        })
                    }),
            )
            .with_stage(
                stage(stages::PUBLISHING)
                    .depends_on(stages::VIDEO_PRODUCTION)
                    .with_input_mapper(|input, outputs| {
                        json!({
                            "content": stage_output(outputs, stages::CONTENT_CREATION),
                            "video": stage_output(outputs, stages::VIDEO_PRODUCTION),
                            "platforms": field_or(input, "platforms", json!([])),
                        })
                    })
                    .with_output_mapper(|output| match output {
                        Value::Object(mut fields) => {
                            fields.entry("published").or_insert(Value::Bool(true));
                            Value::Object(fields)
                        }
                        other => json!({ "published": true, "result": other }),
                    }),
            )
    }
}

fn field_or(input: &Value, key: &str, default: Value) -> Value {
    input.get(key).cloned().unwrap_or(default)
}

fn stage_output(outputs: &Map<String, Value>, stage: &str) -> Value {
    outputs.get(stage).cloned().unwrap_or(Value::Null)
}
