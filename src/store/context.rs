//! # Session Context Store
//!
//! Collaborator interface for the per-session conversation context. The saga
//! executor and pipeline runner append human-readable progress notes here; any
//! failure is logged by the caller and swallowed.

use super::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Author of the message, e.g. `system` or an agent name
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub tenant_id: String,
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    /// Latest state reported by each agent, keyed by agent name
    pub agent_states: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(tenant_id: &str, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            messages: Vec::new(),
            agent_states: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get_context(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<SessionContext>>;

    async fn create_context(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> StoreResult<SessionContext>;

    async fn save_context(&self, context: SessionContext) -> StoreResult<()>;

    async fn add_conversation_message(
        &self,
        tenant_id: &str,
        session_id: &str,
        message: ConversationMessage,
    ) -> StoreResult<()>;

    async fn update_agent_state(
        &self,
        tenant_id: &str,
        session_id: &str,
        agent: &str,
        state: Value,
    ) -> StoreResult<()>;
}

/// DashMap-backed context store keyed by `(tenant_id, session_id)`
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    contexts: DashMap<(String, String), SessionContext>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &str, session_id: &str) -> (String, String) {
        (tenant_id.to_string(), session_id.to_string())
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get_context(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> StoreResult<Option<SessionContext>> {
        Ok(self
            .contexts
            .get(&Self::key(tenant_id, session_id))
            .map(|entry| entry.value().clone()))
    }

    async fn create_context(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> StoreResult<SessionContext> {
        let context = self
            .contexts
            .entry(Self::key(tenant_id, session_id))
            .or_insert_with(|| SessionContext::new(tenant_id, session_id))
            .value()
            .clone();
        Ok(context)
    }

    async fn save_context(&self, context: SessionContext) -> StoreResult<()> {
        let key = Self::key(&context.tenant_id, &context.session_id);
        self.contexts.insert(key, context);
        Ok(())
    }

    async fn add_conversation_message(
        &self,
        tenant_id: &str,
        session_id: &str,
        message: ConversationMessage,
    ) -> StoreResult<()> {
        let mut entry = self
            .contexts
            .get_mut(&Self::key(tenant_id, session_id))
            .ok_or_else(|| StoreError::NotFound {
                key: format!("{tenant_id}/{session_id}"),
            })?;
        entry.messages.push(message);
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn update_agent_state(
        &self,
        tenant_id: &str,
        session_id: &str,
        agent: &str,
        state: Value,
    ) -> StoreResult<()> {
        let mut entry = self
            .contexts
            .get_mut(&Self::key(tenant_id, session_id))
            .ok_or_else(|| StoreError::NotFound {
                key: format!("{tenant_id}/{session_id}"),
            })?;
        entry.agent_states.insert(agent.to_string(), state);
        entry.updated_at = Utc::now();
        Ok(())
    }
}
