//! # Orchestration Core
//!
//! Single bootstrap path that wires the event bus, task planner, saga executor,
//! pipeline runner and heartbeat monitor from one [`OrchestratorConfig`], and
//! exposes their operations behind one handle.
//!
//! The core is transport-agnostic: whatever RPC or HTTP layer the host
//! application uses calls these methods directly.
//!
//! ```rust,no_run
//! use viralize_core::config::OrchestratorConfig;
//! use viralize_core::orchestration::{CapabilityRegistry, OrchestrationCore};
//! use viralize_core::store::InMemoryContextStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> viralize_core::Result<()> {
//! let core = OrchestrationCore::bootstrap(
//!     OrchestratorConfig::default(),
//!     CapabilityRegistry::new(),
//!     Arc::new(InMemoryContextStore::new()),
//! )?;
//! core.start().await?;
//! let health = core.get_system_health().await?;
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```

use super::capability::CapabilityRegistry;
use super::pipeline_runner::PipelineRunner;
use super::saga_executor::SagaExecutor;
use crate::config::{ConfigManager, OrchestratorConfig};
use crate::error::Result;
use crate::events::{
    EventBus, EventDraft, EventHandler, EventId, SubscriptionId, SubscriptionOptions,
};
use crate::health::{HeartbeatMonitor, MonitorHandle};
use crate::logging::init_structured_logging;
use crate::models::{
    AgentHealthStatus, AgentSnapshot, AlertStats, HeartbeatData, PipelineExecution,
    PipelineMetrics, PipelineResult, Plan, PlanningResult, Saga, SystemHealth,
};
use crate::planner::TaskPlanner;
use crate::store::{ContextStore, InMemoryStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub struct OrchestrationCore {
    config: OrchestratorConfig,
    registry: CapabilityRegistry,
    event_bus: EventBus,
    planner: TaskPlanner,
    saga_executor: Arc<SagaExecutor>,
    pipeline_runner: Arc<PipelineRunner>,
    heartbeat_monitor: Arc<HeartbeatMonitor>,
    sweep: Mutex<Option<MonitorHandle>>,
}

impl std::fmt::Debug for OrchestrationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationCore")
            .field("environment", &self.config.environment)
            .field("capabilities", &self.registry.keys())
            .finish()
    }
}

impl OrchestrationCore {
    /// Build every component from `config` with in-memory stores and transport
    pub fn bootstrap(
        config: OrchestratorConfig,
        registry: CapabilityRegistry,
        context_store: Arc<dyn ContextStore>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            environment = %config.environment,
            capabilities = registry.len(),
            "🔧 Bootstrapping orchestration core"
        );

        let event_bus = EventBus::in_memory(config.event_bus.clone());
        let planner = TaskPlanner::new(config.planner.clone());
        let saga_executor = Arc::new(SagaExecutor::new(
            config.saga.clone(),
            registry.clone(),
            Arc::new(InMemoryStore::new()),
            Arc::clone(&context_store),
            event_bus.clone(),
        ));
        let pipeline_runner = Arc::new(PipelineRunner::new(
            config.pipeline.clone(),
            registry.clone(),
            Arc::new(InMemoryStore::new()),
            context_store,
            event_bus.clone(),
        ));
        let heartbeat_monitor = Arc::new(HeartbeatMonitor::new(
            config.heartbeat.clone(),
            Arc::new(InMemoryStore::new()),
            event_bus.clone(),
        ));

        Ok(Self {
            config,
            registry,
            event_bus,
            planner,
            saga_executor,
            pipeline_runner,
            heartbeat_monitor,
            sweep: Mutex::new(None),
        })
    }

    /// [`Self::bootstrap`] from a loaded configuration manager
    ///
    /// Also installs the structured logging subscriber described by the
    /// configuration, unless one is already in place.
    pub fn from_config_manager(
        manager: &ConfigManager,
        registry: CapabilityRegistry,
        context_store: Arc<dyn ContextStore>,
    ) -> Result<Self> {
        init_structured_logging(&manager.config().logging);
        Self::bootstrap(manager.config().clone(), registry, context_store)
    }

    /// Subscribe the heartbeat monitor to agent events and start the health sweep
    ///
    /// Calling it again while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut sweep = self.sweep.lock().await;
        if sweep.is_some() {
            return Ok(());
        }
        self.heartbeat_monitor.attach(&self.event_bus).await?;
        *sweep = Some(Arc::clone(&self.heartbeat_monitor).start());
        info!("🚀 Orchestration core started");
        Ok(())
    }

    /// Stop the health sweep and close every event subscription
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweep.lock().await.take() {
            handle.shutdown().await;
        }
        self.event_bus.shutdown().await;
        info!("🛑 Orchestration core stopped");
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn planner(&self) -> &TaskPlanner {
        &self.planner
    }

    pub fn saga_executor(&self) -> &Arc<SagaExecutor> {
        &self.saga_executor
    }

    pub fn pipeline_runner(&self) -> &Arc<PipelineRunner> {
        &self.pipeline_runner
    }

    pub fn heartbeat_monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.heartbeat_monitor
    }

    // Event bus

    pub async fn publish(&self, draft: EventDraft) -> Result<EventId> {
        self.event_bus.publish(draft).await
    }

    pub async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId> {
        self.event_bus.subscribe(pattern, handler, options).await
    }

    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<()> {
        self.event_bus.unsubscribe(subscription_id).await
    }

    // Planning and sagas

    pub fn generate_plan(
        &self,
        tenant_id: &str,
        session_id: &str,
        analysis: &Value,
    ) -> Result<PlanningResult> {
        self.planner.generate_plan(tenant_id, session_id, analysis)
    }

    pub async fn create_and_execute_saga(
        &self,
        plan: &Plan,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Saga> {
        self.saga_executor
            .create_and_execute_saga(plan, tenant_id, session_id)
            .await
    }

    pub async fn get_saga_status(&self, saga_id: Uuid) -> Result<Option<Saga>> {
        self.saga_executor.get_saga_status(saga_id).await
    }

    pub async fn get_tenant_sagas(&self, tenant_id: &str) -> Result<Vec<Saga>> {
        self.saga_executor.get_tenant_sagas(tenant_id).await
    }

    // Pipelines

    pub async fn execute_viralization_pipeline(
        &self,
        tenant_id: &str,
        session_id: &str,
        input_data: Value,
    ) -> Result<PipelineResult> {
        self.pipeline_runner
            .execute_viralization_pipeline(tenant_id, session_id, input_data)
            .await
    }

    pub async fn get_pipeline_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<PipelineExecution>> {
        self.pipeline_runner.get_pipeline_execution(execution_id).await
    }

    pub async fn get_tenant_executions(&self, tenant_id: &str) -> Result<Vec<PipelineExecution>> {
        self.pipeline_runner.get_tenant_executions(tenant_id).await
    }

    pub fn get_pipeline_metrics(&self) -> PipelineMetrics {
        self.pipeline_runner.get_pipeline_metrics()
    }

    // Health

    pub async fn process_heartbeat(
        &self,
        agent_id: &str,
        data: HeartbeatData,
    ) -> Result<AgentHealthStatus> {
        self.heartbeat_monitor.process_heartbeat(agent_id, data).await
    }

    pub async fn process_agent_error(
        &self,
        agent_id: &str,
        error: &str,
    ) -> Result<AgentHealthStatus> {
        self.heartbeat_monitor.process_agent_error(agent_id, error).await
    }

    pub async fn get_system_health(&self) -> Result<SystemHealth> {
        self.heartbeat_monitor.get_system_health().await
    }

    pub fn get_alert_stats(&self) -> AlertStats {
        self.heartbeat_monitor.get_alert_stats()
    }

    pub fn get_agent_history(&self, agent_id: &str) -> Vec<AgentSnapshot> {
        self.heartbeat_monitor.get_agent_history(agent_id)
    }
}
