//! Shared test doubles and fixtures for the integration suites.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use viralize_core::config::OrchestratorConfig;
use viralize_core::events::{handler_fn, Event, EventBus, SubscriptionOptions};
use viralize_core::models::ActionType;
use viralize_core::orchestration::{
    CapabilityProvider, CapabilityRegistry, CapabilityRequest, OrchestrationCore,
};
use viralize_core::resilience::ExternalError;
use viralize_core::store::{
    ContextStore, ConversationMessage, InMemoryContextStore, SessionContext, StoreError,
    StoreResult,
};

pub const ACTION_TYPES: [ActionType; 5] = [
    ActionType::AudienceAnalysis,
    ActionType::TimingOptimization,
    ActionType::ContentCreation,
    ActionType::ContentGeneration,
    ActionType::Scheduling,
];

pub const PIPELINE_STAGES: [&str; 4] = [
    "trend_analysis",
    "content_creation",
    "video_production",
    "publishing",
];

/// How a [`ScriptedProvider`] answers
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    AlwaysFail(ExternalError),
    /// Fail the first `n` calls, then succeed
    FailTimes(u32),
    /// Never answer
    Hang,
}

/// Deterministic capability provider that counts calls and logs compensations
/// into a journal shared across providers
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    behavior: Behavior,
    calls: AtomicU32,
    journal: Arc<Mutex<Vec<String>>>,
    compensates: bool,
}

impl ScriptedProvider {
    pub fn new(name: &str, behavior: Behavior, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicU32::new(0),
            journal,
            compensates: true,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &CapabilityRequest) -> Result<Value, ExternalError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => Ok(json!({ "by": self.name, "attempt": request.attempt })),
            Behavior::AlwaysFail(error) => Err(error.clone()),
            Behavior::FailTimes(n) if call < *n => {
                Err(ExternalError::transient(format!("{} flaked", self.name)))
            }
            Behavior::FailTimes(_) => Ok(json!({ "by": self.name, "attempt": request.attempt })),
            Behavior::Hang => {
                futures::future::pending::<()>().await;
                Ok(Value::Null)
            }
        }
    }

    async fn compensate(
        &self,
        _request: &CapabilityRequest,
        _output: &Value,
    ) -> Result<(), ExternalError> {
        self.journal.lock().push(self.name.clone());
        Ok(())
    }

    fn supports_compensation(&self) -> bool {
        self.compensates
    }
}

/// Context store whose backend is permanently down; counts every call
#[derive(Debug, Default)]
pub struct UnavailableContextStore {
    calls: AtomicU32,
}

impl UnavailableContextStore {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("context backend offline".to_string()))
    }
}

#[async_trait]
impl ContextStore for UnavailableContextStore {
    async fn get_context(
        &self,
        _tenant_id: &str,
        _session_id: &str,
    ) -> StoreResult<Option<SessionContext>> {
        self.fail()
    }

    async fn create_context(
        &self,
        _tenant_id: &str,
        _session_id: &str,
    ) -> StoreResult<SessionContext> {
        self.fail()
    }

    async fn save_context(&self, _context: SessionContext) -> StoreResult<()> {
        self.fail()
    }

    async fn add_conversation_message(
        &self,
        _tenant_id: &str,
        _session_id: &str,
        _message: ConversationMessage,
    ) -> StoreResult<()> {
        self.fail()
    }

    async fn update_agent_state(
        &self,
        _tenant_id: &str,
        _session_id: &str,
        _agent: &str,
        _state: Value,
    ) -> StoreResult<()> {
        self.fail()
    }
}

/// Registry with a succeeding provider for every action type and stage,
/// except the overrides given
pub fn registry_with(
    journal: &Arc<Mutex<Vec<String>>>,
    overrides: &[(&str, Behavior)],
) -> (CapabilityRegistry, Vec<Arc<ScriptedProvider>>) {
    let registry = CapabilityRegistry::new();
    let mut providers = Vec::new();

    let names = ACTION_TYPES
        .iter()
        .map(|kind| kind.as_str())
        .chain(PIPELINE_STAGES.iter().copied());
    for name in names {
        if registry.contains(name) {
            continue;
        }
        let behavior = overrides
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, behavior)| behavior.clone())
            .unwrap_or(Behavior::Succeed);
        let provider = ScriptedProvider::new(name, behavior, Arc::clone(journal));
        registry.register(name, provider.clone());
        providers.push(provider);
    }
    (registry, providers)
}

pub fn provider<'a>(providers: &'a [Arc<ScriptedProvider>], name: &str) -> &'a ScriptedProvider {
    providers
        .iter()
        .find(|provider| provider.name() == name)
        .expect("provider registered")
}

/// Analysis that produces the five-action reference plan
pub fn reference_analysis() -> Value {
    json!({
        "engagementRate": 0.08,
        "audienceSize": 20000,
        "contentTypes": ["video"],
        "competitionLevel": "low"
    })
}

/// Configuration with millisecond backoffs so real-time tests stay fast
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.saga.retry_backoff_ms = 1;
    config.saga.max_retry_backoff_ms = 5;
    config.pipeline.default_backoff_ms = 1;
    config.event_bus.base_backoff_ms = 1;
    config.event_bus.max_jitter_ms = 0;
    config
}

pub fn core_with(registry: CapabilityRegistry, config: OrchestratorConfig) -> OrchestrationCore {
    OrchestrationCore::bootstrap(config, registry, Arc::new(InMemoryContextStore::new()))
        .expect("valid configuration")
}

/// Collect every event matching `pattern` into a shared vector
pub async fn collect_events(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<Event>>> {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&sink);
    bus.subscribe(
        pattern,
        handler_fn("test.collector", move |event: Event| {
            let writer = Arc::clone(&writer);
            async move {
                writer.lock().push(event);
                Ok(())
            }
        }),
        SubscriptionOptions::named("test.collector"),
    )
    .await
    .expect("subscribe collector");
    sink
}

/// Poll `condition` until it holds, panicking after a generous bound
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("viralize_core=debug")
        .with_test_writer()
        .try_init();
}
