//! # System Constants
//!
//! Event names, channel names and system-wide constants shared by every
//! orchestration component.

/// Lifecycle events published on the event bus
pub mod events {
    // Saga lifecycle events
    pub const SAGA_CREATED: &str = "saga.created";
    pub const SAGA_STARTED: &str = "saga.started";
    pub const SAGA_STEP_STARTED: &str = "saga.step.started";
    pub const SAGA_STEP_COMPLETED: &str = "saga.step.completed";
    pub const SAGA_STEP_RETRYING: &str = "saga.step.retrying";
    pub const SAGA_STEP_FAILED: &str = "saga.step.failed";
    pub const SAGA_COMPENSATION_STARTED: &str = "saga.compensation.started";
    pub const SAGA_STEP_COMPENSATED: &str = "saga.step.compensated";
    pub const SAGA_STEP_COMPENSATION_FAILED: &str = "saga.step.compensation_failed";
    pub const SAGA_COMPLETED: &str = "saga.completed";
    pub const SAGA_FAILED: &str = "saga.failed";

    // Pipeline lifecycle events
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    pub const PIPELINE_STAGE_STARTED: &str = "pipeline.stage.started";
    pub const PIPELINE_STAGE_COMPLETED: &str = "pipeline.stage.completed";
    pub const PIPELINE_STAGE_RETRYING: &str = "pipeline.stage.retrying";
    pub const PIPELINE_STAGE_FAILED: &str = "pipeline.stage.failed";
    pub const PIPELINE_STAGE_SKIPPED: &str = "pipeline.stage.skipped";
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    pub const PIPELINE_FAILED: &str = "pipeline.failed";

    // Health events
    pub const AGENT_HEARTBEAT: &str = "agent.heartbeat";
    pub const AGENT_ERROR: &str = "agent.error";
    pub const HEALTH_ALERT_RAISED: &str = "health.alert.raised";
    pub const SYSTEM_HEALTH_SNAPSHOT: &str = "system.health.snapshot";

    // Dead letter wrapper type
    pub const DEAD_LETTER: &str = "dead_letter";
}

/// Channel naming conventions
pub mod channels {
    pub const DEFAULT_PREFIX: &str = "viralize.events";
    pub const DEFAULT_DEAD_LETTER: &str = "viralize.events.dead_letter";
}

/// Reserved keys used when mapping data between pipeline stages
pub mod pipeline_keys {
    pub const PREVIOUS_STAGE: &str = "previousStage";
    pub const INPUT: &str = "input";
}

/// Reference stage names for the viralization pipeline
pub mod stages {
    pub const TREND_ANALYSIS: &str = "trend_analysis";
    pub const CONTENT_CREATION: &str = "content_creation";
    pub const VIDEO_PRODUCTION: &str = "video_production";
    pub const PUBLISHING: &str = "publishing";
}

pub mod system {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const PLANNER_VERSION: &str = "2";
    /// Hard cap on event bus retry backoff
    pub const MAX_EVENT_BACKOFF_MS: u64 = 30_000;
}
