//! # Capability Providers
//!
//! Interface boundary to the services that do the actual work ("create video",
//! "schedule post", ...). The saga executor binds plan actions to providers by
//! action type; the pipeline runner binds stages by stage name. Any error a
//! provider returns is the trigger for retry and compensation.
//!
//! Providers can implement [`CapabilityProvider`] directly or be built from
//! closures with [`FnCapability`], which accepts `anyhow::Result` so adapters can
//! use `?` on whatever client library they wrap.
//!
//! ```rust
//! use viralize_core::orchestration::{
//!     CapabilityProvider, CapabilityRegistry, CapabilityRequest, FnCapability,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = CapabilityRegistry::new();
//! registry.register(
//!     "scheduling",
//!     Arc::new(FnCapability::new("scheduler", |request: CapabilityRequest| async move {
//!         Ok(json!({ "scheduled": true, "attempt": request.attempt }))
//!     })),
//! );
//!
//! let provider = registry.get("scheduling").unwrap();
//! let request = CapabilityRequest::new("tenant-1", "session-1", "scheduling", json!({}));
//! let output = provider.execute(&request).await.unwrap();
//! assert_eq!(output["scheduled"], true);
//! # });
//! ```

use crate::resilience::ExternalError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Input handed to a provider for one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub tenant_id: String,
    pub session_id: String,
    /// Action type or stage name being executed
    pub operation: String,
    pub input: Value,
    /// 1-based invocation number, retries included
    pub attempt: u32,
}

impl CapabilityRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        operation: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            session_id: session_id.into(),
            operation: operation.into(),
            input,
            attempt: 1,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, request: &CapabilityRequest) -> Result<Value, ExternalError>;

    /// Undo a previous successful `execute` that produced `output`
    async fn compensate(
        &self,
        _request: &CapabilityRequest,
        _output: &Value,
    ) -> Result<(), ExternalError> {
        Ok(())
    }

    fn supports_compensation(&self) -> bool {
        false
    }
}

type ExecuteFn =
    Arc<dyn Fn(CapabilityRequest) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
type CompensateFn =
    Arc<dyn Fn(CapabilityRequest, Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Closure-backed provider
#[derive(Clone)]
pub struct FnCapability {
    name: String,
    execute: ExecuteFn,
    compensate: Option<CompensateFn>,
}

impl std::fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability")
            .field("name", &self.name)
            .field("compensates", &self.compensate.is_some())
            .finish()
    }
}

impl FnCapability {
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(CapabilityRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            execute: Arc::new(move |request| execute(request).boxed()),
            compensate: None,
        }
    }

    pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
    where
        F: Fn(CapabilityRequest, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.compensate = Some(Arc::new(move |request, output| {
            compensate(request, output).boxed()
        }));
        self
    }
}

#[async_trait]
impl CapabilityProvider for FnCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &CapabilityRequest) -> Result<Value, ExternalError> {
        (self.execute)(request.clone())
            .await
            .map_err(ExternalError::from)
    }

    async fn compensate(
        &self,
        request: &CapabilityRequest,
        output: &Value,
    ) -> Result<(), ExternalError> {
        match &self.compensate {
            Some(compensate) => compensate(request.clone(), output.clone())
                .await
                .map_err(ExternalError::from),
            None => Ok(()),
        }
    }

    fn supports_compensation(&self) -> bool {
        self.compensate.is_some()
    }
}

/// Thread-safe provider lookup keyed by action type or stage name
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    providers: Arc<DashMap<String, Arc<dyn CapabilityProvider>>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `key`, replacing any previous provider
    pub fn register(&self, key: impl Into<String>, provider: Arc<dyn CapabilityProvider>) {
        let key = key.into();
        debug!(key = %key, provider = provider.name(), "Registered capability provider");
        self.providers.insert(key, provider);
    }

    /// Register `provider` under its own name
    pub fn register_provider(&self, provider: Arc<dyn CapabilityProvider>) {
        let key = provider.name().to_string();
        self.register(key, provider);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn CapabilityProvider>> {
        self.providers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<dyn CapabilityProvider>> {
        self.providers.remove(key).map(|(_, provider)| provider)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> CapabilityRequest {
        CapabilityRequest::new("t", "s", "scheduling", json!({"slot": 9}))
    }

    #[tokio::test]
    async fn test_fn_capability_executes_closure() {
        let provider = FnCapability::new("echo", |request: CapabilityRequest| async move {
            Ok(json!({ "echo": request.input, "attempt": request.attempt }))
        });

        let output = provider.execute(&request().with_attempt(2)).await.unwrap();
        assert_eq!(output, json!({"echo": {"slot": 9}, "attempt": 2}));
        assert!(!provider.supports_compensation());
        assert!(provider.compensate(&request(), &output).await.is_ok());
    }

    #[tokio::test]
    async fn test_anyhow_errors_become_external_errors() {
        let provider = FnCapability::new("critical", |_request| async move {
            Err::<Value, _>(anyhow::Error::new(ExternalError::critical("forbidden")))
        });
        let err = provider.execute(&request()).await.unwrap_err();
        assert_eq!(err, ExternalError::critical("forbidden"));

        let provider = FnCapability::new("plain", |_request| async move {
            Err::<Value, _>(anyhow::anyhow!("socket closed"))
        });
        let err = provider.execute(&request()).await.unwrap_err();
        assert!(matches!(err, ExternalError::Unclassified(_)));
    }

    #[tokio::test]
    async fn test_compensation_receives_output() {
        let provider = FnCapability::new("post", |_request| async move { Ok(json!({"postId": 7})) })
            .with_compensation(|_request, output: Value| async move {
                anyhow::ensure!(output["postId"] == 7, "wrong output");
                Ok(())
            });

        assert!(provider.supports_compensation());
        let output = provider.execute(&request()).await.unwrap();
        assert!(provider.compensate(&request(), &output).await.is_ok());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = CapabilityRegistry::new();
        assert!(registry.is_empty());

        registry.register_provider(Arc::new(FnCapability::new("scheduling", |_r| async move {
            Ok(Value::Null)
        })));
        registry.register(
            "publishing",
            Arc::new(FnCapability::new("publisher", |_r| async move { Ok(Value::Null) })),
        );

        assert!(registry.contains("scheduling"));
        assert_eq!(registry.get("publishing").unwrap().name(), "publisher");
        assert_eq!(registry.keys(), vec!["publishing".to_string(), "scheduling".to_string()]);
        assert!(registry.remove("publishing").is_some());
        assert_eq!(registry.len(), 1);
    }
}
