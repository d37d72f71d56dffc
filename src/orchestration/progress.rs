//! Human-readable progress notes written to the session context store.
//!
//! Notes are observational: every store failure is logged and swallowed so a
//! context outage never changes a saga or pipeline outcome.

use crate::store::{ContextStore, ConversationMessage};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct ProgressNotes {
    store: Arc<dyn ContextStore>,
    agent: &'static str,
}

impl ProgressNotes {
    pub(crate) fn new(store: Arc<dyn ContextStore>, agent: &'static str) -> Self {
        Self { store, agent }
    }

    /// Make sure the session exists before notes are appended
    pub(crate) async fn open_session(&self, tenant_id: &str, session_id: &str) {
        match self.store.get_context(tenant_id, session_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.store.create_context(tenant_id, session_id).await {
                    warn!(
                        agent = self.agent,
                        tenant_id,
                        session_id,
                        error = %e,
                        "Failed to create session context"
                    );
                }
            }
            Err(e) => {
                warn!(
                    agent = self.agent,
                    tenant_id,
                    session_id,
                    error = %e,
                    "Failed to read session context"
                );
            }
        }
    }

    pub(crate) async fn note(
        &self,
        tenant_id: &str,
        session_id: &str,
        content: String,
        metadata: Value,
    ) {
        let message = ConversationMessage::system(content).with_metadata(metadata);
        if let Err(e) = self
            .store
            .add_conversation_message(tenant_id, session_id, message)
            .await
        {
            warn!(
                agent = self.agent,
                tenant_id,
                session_id,
                error = %e,
                "Failed to record progress note"
            );
        }
    }

    pub(crate) async fn agent_state(&self, tenant_id: &str, session_id: &str, state: Value) {
        if let Err(e) = self
            .store
            .update_agent_state(tenant_id, session_id, self.agent, state)
            .await
        {
            warn!(
                agent = self.agent,
                tenant_id,
                session_id,
                error = %e,
                "Failed to update agent state"
            );
        }
    }
}
