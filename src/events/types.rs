//! Event model shared by publishers, the bus and subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type EventId = Uuid;

/// A published event. Immutable once handed to the bus; retried copies are new
/// values that carry an incremented `retry_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub tenant_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Event {
    /// Copy of this event for the next delivery attempt
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.retry_count += 1;
        next
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Publisher-side description of an event; the bus fills in identity, timestamp
/// and retry bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_type: String,
    pub tenant_id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub payload: Value,
    pub correlation_id: Option<String>,
    pub max_retries: Option<u32>,
}

impl EventDraft {
    pub fn new(
        event_type: impl Into<String>,
        tenant_id: impl Into<String>,
        session_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id: tenant_id.into(),
            session_id: session_id.into(),
            user_id: None,
            payload,
            correlation_id: None,
            max_retries: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub(crate) fn into_event(self, default_max_retries: u32) -> Event {
        Event {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            tenant_id: self.tenant_id,
            session_id: self.session_id,
            user_id: self.user_id,
            payload: self.payload,
            timestamp: Utc::now(),
            correlation_id: self.correlation_id,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
        }
    }
}

impl From<&Event> for EventDraft {
    /// Draft that republishes the same content under a fresh identity
    fn from(event: &Event) -> Self {
        Self {
            event_type: event.event_type.clone(),
            tenant_id: event.tenant_id.clone(),
            session_id: event.session_id.clone(),
            user_id: event.user_id.clone(),
            payload: event.payload.clone(),
            correlation_id: event.correlation_id.clone(),
            max_retries: Some(event.max_retries),
        }
    }
}

/// An event that exhausted its retry budget (or failed critically)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub original_event: Event,
    pub failure_reason: String,
    pub failure_category: String,
    pub failed_at: DateTime<Utc>,
    pub subscription: String,
}
