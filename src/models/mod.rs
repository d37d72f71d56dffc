pub mod health;
pub mod pipeline;
pub mod plan;
pub mod saga;

// Re-export core models for easy access
pub use health::{
    AgentHealthStatus, AgentSnapshot, AgentStatus, AlertSeverity, AlertStats, HealthAlert,
    HeartbeatData, SystemHealth, SystemHealthStatus,
};
pub use pipeline::{
    PipelineExecution, PipelineMetrics, PipelineResult, RetryConfig, StageMetrics, StageRecord,
    StageResult,
};
pub use plan::{
    Action, ActionId, ActionStatus, ActionType, Plan, PlanStatus, PlanningResult,
    ResourceRequirements, Risk, RiskKind, RiskLevel,
};
pub use saga::{CompensationStatus, Saga, SagaStats, SagaStepRecord, SagaTransition};
