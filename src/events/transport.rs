//! # Event Transport
//!
//! Pub/sub channel abstraction underneath the [`EventBus`](super::bus::EventBus).
//! A transport needs two things: publish-by-channel and at-least-once delivery to
//! every open stream whose pattern matches the channel. The dead-letter channel is
//! an ordinary channel.

use super::types::Event;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub type SubscriptionId = Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,
    #[error("Publishing to channel {channel} failed: {reason}")]
    PublishFailed { channel: String, reason: String },
    #[error("Subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),
}

/// An event in flight on a channel
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub channel: String,
    pub event: Event,
    /// Restricts delivery to one subscription (used for targeted redelivery)
    pub target: Option<SubscriptionId>,
}

impl TransportMessage {
    pub fn broadcast(channel: impl Into<String>, event: Event) -> Self {
        Self {
            channel: channel.into(),
            event,
            target: None,
        }
    }

    pub fn targeted(channel: impl Into<String>, event: Event, target: SubscriptionId) -> Self {
        Self {
            channel: channel.into(),
            event,
            target: Some(target),
        }
    }
}

/// Channel-name pattern: exact, `prefix*`, `*suffix`, or `*`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPattern(String);

impl ChannelPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, channel: &str) -> bool {
        let pattern = self.0.as_str();
        if pattern == "*" {
            true
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            channel.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            channel.ends_with(suffix)
        } else {
            channel == pattern
        }
    }
}

pub type MessageStream = mpsc::UnboundedReceiver<TransportMessage>;

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Deliver `message` to every matching stream
    async fn publish(&self, message: TransportMessage) -> Result<(), TransportError>;

    /// Open a stream receiving every message whose channel matches `pattern`
    async fn open_stream(
        &self,
        subscription_id: SubscriptionId,
        pattern: ChannelPattern,
    ) -> Result<MessageStream, TransportError>;

    async fn close_stream(&self, subscription_id: SubscriptionId) -> Result<(), TransportError>;

    /// Number of currently open streams
    fn stream_count(&self) -> usize;
}

struct StreamEntry {
    pattern: ChannelPattern,
    sender: mpsc::UnboundedSender<TransportMessage>,
}

/// Process-local transport; unbounded per-stream queues give lossless, FIFO delivery
#[derive(Default)]
pub struct InMemoryTransport {
    streams: DashMap<SubscriptionId, StreamEntry>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventTransport for InMemoryTransport {
    async fn publish(&self, message: TransportMessage) -> Result<(), TransportError> {
        let mut closed = Vec::new();
        let mut delivered = 0usize;

        for entry in self.streams.iter() {
            if let Some(target) = message.target {
                if *entry.key() != target {
                    continue;
                }
            }
            if !entry.value().pattern.matches(&message.channel) {
                continue;
            }
            if entry.value().sender.send(message.clone()).is_err() {
                closed.push(*entry.key());
            } else {
                delivered += 1;
            }
        }

        for id in closed {
            warn!(subscription_id = %id, "Dropping closed transport stream");
            self.streams.remove(&id);
        }

        debug!(
            channel = %message.channel,
            event_id = %message.event.id,
            delivered = delivered,
            "Transport message published"
        );
        Ok(())
    }

    async fn open_stream(
        &self,
        subscription_id: SubscriptionId,
        pattern: ChannelPattern,
    ) -> Result<MessageStream, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.streams
            .insert(subscription_id, StreamEntry { pattern, sender });
        Ok(receiver)
    }

    async fn close_stream(&self, subscription_id: SubscriptionId) -> Result<(), TransportError> {
        self.streams
            .remove(&subscription_id)
            .map(|_| ())
            .ok_or(TransportError::SubscriptionNotFound(subscription_id))
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventDraft;
    use serde_json::json;

    fn event(kind: &str) -> Event {
        EventDraft::new(kind, "t", "s", json!({})).into_event(3)
    }

    #[test]
    fn test_pattern_matching() {
        assert!(ChannelPattern::new("*").matches("anything"));
        let saga = ChannelPattern::new("viralize.events.saga.*");
        assert!(saga.matches("viralize.events.saga.started"));
        assert!(!saga.matches("viralize.events.pipeline.started"));
        assert!(ChannelPattern::new("*.failed").matches("viralize.events.saga.failed"));
        assert!(ChannelPattern::new("a.b").matches("a.b"));
        assert!(!ChannelPattern::new("a.b").matches("a.bc"));
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_streams_only() {
        let transport = InMemoryTransport::new();
        let saga_id = Uuid::new_v4();
        let all_id = Uuid::new_v4();
        let mut saga_stream = transport
            .open_stream(saga_id, ChannelPattern::new("ch.saga.*"))
            .await
            .unwrap();
        let mut all_stream = transport
            .open_stream(all_id, ChannelPattern::new("*"))
            .await
            .unwrap();

        transport
            .publish(TransportMessage::broadcast("ch.pipeline.started", event("pipeline.started")))
            .await
            .unwrap();
        transport
            .publish(TransportMessage::broadcast("ch.saga.started", event("saga.started")))
            .await
            .unwrap();

        assert_eq!(saga_stream.recv().await.unwrap().channel, "ch.saga.started");
        assert_eq!(all_stream.recv().await.unwrap().channel, "ch.pipeline.started");
        assert_eq!(all_stream.recv().await.unwrap().channel, "ch.saga.started");
        assert!(saga_stream.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_targeted_message_skips_other_streams() {
        let transport = InMemoryTransport::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut stream_a = transport.open_stream(a, ChannelPattern::new("*")).await.unwrap();
        let mut stream_b = transport.open_stream(b, ChannelPattern::new("*")).await.unwrap();

        transport
            .publish(TransportMessage::targeted("ch.x", event("x"), b))
            .await
            .unwrap();

        assert!(stream_b.recv().await.is_some());
        assert!(stream_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_unknown_stream_errors() {
        let transport = InMemoryTransport::new();
        let result = transport.close_stream(Uuid::new_v4()).await;
        assert!(matches!(result, Err(TransportError::SubscriptionNotFound(_))));
    }
}
