//! # Event Bus
//!
//! Publish/subscribe fabric with per-event retry and dead-letter routing.
//!
//! ## Delivery model
//!
//! - `publish` stamps the event (`id`, `timestamp`, `retry_count = 0`, default
//!   `max_retries`) and routes it to `<prefix>.<event_type>`.
//! - Every subscription owns one dispatcher task that calls its handler
//!   sequentially, so order is preserved per (channel, handler) pair as far as the
//!   transport preserves publish order. Nothing is ordered across event types.
//! - A handler failure goes through [`EventBus::handle_failed_event`]: the event is
//!   redelivered to that subscription only, with `retry_count + 1`, after an
//!   exponential backoff with jitter; once `retry_count >= max_retries` (or the
//!   failure is critical) it is wrapped and published on the dead-letter channel.
//!
//! Delivery is at-least-once: a handler may see the same event id more than once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use viralize_core::events::{handler_fn, EventBus, EventDraft, SubscriptionOptions};
//! use viralize_core::config::EventBusConfig;
//! use serde_json::json;
//!
//! # async fn example() -> viralize_core::Result<()> {
//! let bus = EventBus::in_memory(EventBusConfig::default());
//!
//! bus.subscribe(
//!     "saga.*",
//!     handler_fn("saga_audit", |event| async move {
//!         println!("{} -> {}", event.event_type, event.payload);
//!         Ok(())
//!     }),
//!     SubscriptionOptions::default(),
//! )
//! .await?;
//!
//! bus.publish(EventDraft::new("saga.started", "tenant-1", "session-1", json!({}))).await?;
//! # Ok(())
//! # }
//! ```

use super::scheduler::{DelayScheduler, TokioDelayScheduler};
use super::transport::{
    ChannelPattern, EventTransport, InMemoryTransport, MessageStream, SubscriptionId,
    TransportMessage,
};
use super::types::{DeadLetterRecord, Event, EventDraft, EventId};
use crate::config::EventBusConfig;
use crate::constants::events as event_names;
use crate::error::{CoreError, Result};
use crate::logging::log_event_operation;
use crate::resilience::{
    BackoffCalculator, BackoffCalculatorConfig, ErrorCategory, ErrorClassifier, ExternalError,
    StandardErrorClassifier,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Trait for event subscribers
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> std::result::Result<(), ExternalError>;

    /// Handler name for identification in logs and dead-letter records
    fn handler_name(&self) -> &str {
        "unnamed_handler"
    }
}

/// Adapts an async closure into an [`EventHandler`]
pub struct FnHandler<F> {
    name: String,
    handler: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), ExternalError>> + Send,
{
    async fn handle(&self, event: &Event) -> std::result::Result<(), ExternalError> {
        (self.handler)(event.clone()).await
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

pub fn handler_fn<F, Fut>(name: impl Into<String>, handler: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), ExternalError>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        handler,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Name used in logs; defaults to the handler name
    pub name: Option<String>,
    /// When false, handler failures are logged and dropped
    pub retry_on_failure: bool,
    /// Overrides the retry budget carried by each event for this subscription
    pub max_retries: Option<u32>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            name: None,
            retry_on_failure: true,
            max_retries: None,
        }
    }
}

impl SubscriptionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_on_failure = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub name: String,
    pub pattern: String,
    pub max_retries: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Observational counters; they carry no delivery guarantee
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBusStats {
    pub active_subscriptions: usize,
    pub published: u64,
    pub delivered: u64,
    pub failed_deliveries: u64,
    pub retries_scheduled: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed_deliveries: AtomicU64,
    retries_scheduled: AtomicU64,
    dead_lettered: AtomicU64,
}

struct SubscriptionEntry {
    info: SubscriptionInfo,
    dispatcher: JoinHandle<()>,
}

struct BusInner {
    config: EventBusConfig,
    transport: Arc<dyn EventTransport>,
    scheduler: Arc<dyn DelayScheduler>,
    classifier: Arc<dyn ErrorClassifier>,
    backoff: BackoffCalculator,
    subscriptions: DashMap<SubscriptionId, SubscriptionEntry>,
    dead_letters: Mutex<VecDeque<DeadLetterRecord>>,
    counters: BusCounters,
}

/// Cloneable handle to a shared event bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channel_prefix", &self.inner.config.channel_prefix)
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish()
    }
}

impl EventBus {
    pub fn new(
        config: EventBusConfig,
        transport: Arc<dyn EventTransport>,
        scheduler: Arc<dyn DelayScheduler>,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        let backoff = BackoffCalculator::new(BackoffCalculatorConfig::from(&config));

        info!(
            channel_prefix = %config.channel_prefix,
            dead_letter_channel = %config.dead_letter_channel,
            default_max_retries = config.default_max_retries,
            "EventBus initialized"
        );

        Self {
            inner: Arc::new(BusInner {
                config,
                transport,
                scheduler,
                classifier,
                backoff,
                subscriptions: DashMap::new(),
                dead_letters: Mutex::new(VecDeque::new()),
                counters: BusCounters::default(),
            }),
        }
    }

    /// Bus over the in-process transport with tokio-timer redelivery
    pub fn in_memory(config: EventBusConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryTransport::new()),
            Arc::new(TokioDelayScheduler),
            Arc::new(StandardErrorClassifier::new()),
        )
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// Publish an event; returns as soon as the transport accepted it
    #[instrument(skip(self, draft), fields(event_type = %draft.event_type))]
    pub async fn publish(&self, draft: EventDraft) -> Result<EventId> {
        let event = draft.into_event(self.inner.config.default_max_retries);
        let event_id = event.id;
        let channel = self.inner.config.channel_for(&event.event_type);

        self.inner
            .transport
            .publish(TransportMessage::broadcast(channel.clone(), event))
            .await?;
        self.inner.counters.published.fetch_add(1, Ordering::Relaxed);

        log_event_operation(
            "publish",
            Some(&event_id.to_string()),
            Some(&channel),
            Some(0),
            "published",
        );
        Ok(event_id)
    }

    /// Publish without failing the caller; lifecycle notifications use this so a
    /// transport problem never breaks the workflow that emitted them
    pub async fn publish_quietly(&self, draft: EventDraft) {
        let event_type = draft.event_type.clone();
        if let Err(e) = self.publish(draft).await {
            warn!(event_type = %event_type, error = %e, "Failed to publish lifecycle event");
        }
    }

    /// Subscribe `handler` to every channel matching `pattern`
    ///
    /// A pattern that does not start with the channel prefix is treated as an
    /// event-type pattern and prefixed, so `"saga.*"` and `"dead_letter"` work.
    /// The configured dead-letter channel is always taken verbatim, even when it
    /// lives outside the prefix.
    pub async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        options: SubscriptionOptions,
    ) -> Result<SubscriptionId> {
        let pattern = self.normalize_pattern(pattern);
        let subscription_id = Uuid::new_v4();
        let max_retries = options.max_retries;
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| handler.handler_name().to_string());

        let stream = self
            .inner
            .transport
            .open_stream(subscription_id, ChannelPattern::new(pattern.clone()))
            .await?;

        let dispatcher = spawn_dispatcher(
            Arc::downgrade(&self.inner),
            subscription_id,
            name.clone(),
            handler,
            options,
            stream,
        );

        let info = SubscriptionInfo {
            id: subscription_id,
            name: name.clone(),
            pattern: pattern.clone(),
            max_retries,
            created_at: Utc::now(),
        };
        self.inner
            .subscriptions
            .insert(subscription_id, SubscriptionEntry { info, dispatcher });

        info!(
            subscription_id = %subscription_id,
            subscriber = %name,
            pattern = %pattern,
            "Registered event subscription"
        );
        Ok(subscription_id)
    }

    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> Result<()> {
        let removed = self.inner.subscriptions.remove(&subscription_id);
        match removed {
            Some((_, entry)) => {
                // Closing the stream lets the dispatcher drain and exit on its own
                if let Err(e) = self.inner.transport.close_stream(subscription_id).await {
                    debug!(subscription_id = %subscription_id, error = %e, "Stream already closed");
                }
                info!(
                    subscription_id = %subscription_id,
                    subscriber = %entry.info.name,
                    "Unregistered event subscription"
                );
                Ok(())
            }
            None => Err(CoreError::NotFound {
                entity: "subscription".to_string(),
                id: subscription_id.to_string(),
            }),
        }
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner
            .subscriptions
            .iter()
            .map(|entry| entry.value().info.clone())
            .collect()
    }

    pub fn get_stats(&self) -> EventBusStats {
        let counters = &self.inner.counters;
        EventBusStats {
            active_subscriptions: self.inner.subscriptions.len(),
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed_deliveries: counters.failed_deliveries.load(Ordering::Relaxed),
            retries_scheduled: counters.retries_scheduled.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Retry or dead-letter an event whose delivery to `subscription_id` failed
    pub async fn handle_failed_event(
        &self,
        subscription_id: SubscriptionId,
        channel: &str,
        event: Event,
        failure: &ExternalError,
    ) {
        let (subscriber, max_retries) = self
            .inner
            .subscriptions
            .get(&subscription_id)
            .map(|entry| (entry.info.name.clone(), entry.info.max_retries))
            .unwrap_or_else(|| ("unknown".to_string(), None));
        self.inner
            .handle_failed_event(subscription_id, &subscriber, max_retries, channel, event, failure)
            .await;
    }

    /// Dead-lettered events still held in memory, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.inner.dead_letters.lock().iter().cloned().collect()
    }

    /// Republish a dead-lettered event under a fresh id with a fresh retry budget
    pub async fn replay_dead_letter(&self, original_event_id: EventId) -> Result<EventId> {
        let record = {
            let mut letters = self.inner.dead_letters.lock();
            let position = letters
                .iter()
                .position(|record| record.original_event.id == original_event_id);
            position.and_then(|index| letters.remove(index))
        };

        let record = record.ok_or_else(|| CoreError::NotFound {
            entity: "dead letter".to_string(),
            id: original_event_id.to_string(),
        })?;

        let draft = EventDraft::from(&record.original_event);
        let replayed = self.publish(draft).await?;
        info!(
            original_event_id = %original_event_id,
            replayed_event_id = %replayed,
            "Replayed dead-lettered event"
        );
        Ok(replayed)
    }

    /// Close every subscription stream
    pub async fn shutdown(&self) {
        let ids: Vec<SubscriptionId> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| *entry.key())
            .collect();
        for id in ids {
            if let Some((_, entry)) = self.inner.subscriptions.remove(&id) {
                if let Err(e) = self.inner.transport.close_stream(id).await {
                    debug!(subscription_id = %id, error = %e, "Stream already closed");
                }
                entry.dispatcher.abort();
            }
        }
        info!("EventBus shut down");
    }

    fn normalize_pattern(&self, pattern: &str) -> String {
        let config = &self.inner.config;
        let prefix = &config.channel_prefix;
        if pattern == "*"
            || pattern == config.dead_letter_channel
            || pattern.starts_with(prefix.as_str())
        {
            pattern.to_string()
        } else {
            format!("{prefix}.{pattern}")
        }
    }
}

fn spawn_dispatcher(
    bus: Weak<BusInner>,
    subscription_id: SubscriptionId,
    name: String,
    handler: Arc<dyn EventHandler>,
    options: SubscriptionOptions,
    mut stream: MessageStream,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = stream.recv().await {
            let Some(inner) = bus.upgrade() else {
                break;
            };
            inner.counters.delivered.fetch_add(1, Ordering::Relaxed);

            let TransportMessage { channel, event, .. } = message;
            match handler.handle(&event).await {
                Ok(()) => {
                    log_event_operation(
                        "deliver",
                        Some(&event.id.to_string()),
                        Some(&channel),
                        Some(event.retry_count),
                        "handled",
                    );
                }
                Err(failure) => {
                    inner
                        .counters
                        .failed_deliveries
                        .fetch_add(1, Ordering::Relaxed);
                    if options.retry_on_failure {
                        inner
                            .handle_failed_event(
                                subscription_id,
                                &name,
                                options.max_retries,
                                &channel,
                                event,
                                &failure,
                            )
                            .await;
                    } else {
                        warn!(
                            subscriber = %name,
                            event_id = %event.id,
                            error = %failure,
                            "Handler failed; retry disabled for subscription"
                        );
                    }
                }
            }
        }
        debug!(subscription_id = %subscription_id, "Dispatcher stopped");
    })
}

impl BusInner {
    async fn handle_failed_event(
        &self,
        subscription_id: SubscriptionId,
        subscriber: &str,
        max_retries_override: Option<u32>,
        channel: &str,
        event: Event,
        failure: &ExternalError,
    ) {
        let operation = format!("event:{}", event.event_type);
        let classified = self.classifier.classify_external(&operation, failure);
        let category = self.classifier.category(&classified);

        if channel == self.config.dead_letter_channel {
            // Never dead-letter a dead letter
            error!(
                subscriber = %subscriber,
                event_id = %event.id,
                error = %failure,
                "Dead-letter handler failed; dropping"
            );
            return;
        }

        let mut event = event;
        if let Some(max_retries) = max_retries_override {
            event.max_retries = max_retries;
        }

        if category == ErrorCategory::Critical || event.retries_exhausted() {
            self.dead_letter(subscriber, event, failure, category).await;
            return;
        }

        let next = event.next_attempt();
        let delay = self.backoff.delay_for_attempt(next.retry_count);
        self.counters
            .retries_scheduled
            .fetch_add(1, Ordering::Relaxed);

        warn!(
            subscriber = %subscriber,
            event_id = %next.id,
            retry_count = next.retry_count,
            max_retries = next.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Scheduling event redelivery"
        );

        let transport = Arc::clone(&self.transport);
        let message = TransportMessage::targeted(channel.to_string(), next, subscription_id);
        self.scheduler.schedule(
            delay,
            async move {
                let event_id = message.event.id;
                if let Err(e) = transport.publish(message).await {
                    error!(event_id = %event_id, error = %e, "Event redelivery failed");
                }
            }
            .boxed(),
        );
    }

    async fn dead_letter(
        &self,
        subscriber: &str,
        event: Event,
        failure: &ExternalError,
        category: ErrorCategory,
    ) {
        let record = DeadLetterRecord {
            original_event: event,
            failure_reason: failure.to_string(),
            failure_category: category.to_string(),
            failed_at: Utc::now(),
            subscription: subscriber.to_string(),
        };

        {
            let mut letters = self.dead_letters.lock();
            letters.push_back(record.clone());
            while letters.len() > self.config.dead_letter_retention {
                letters.pop_front();
            }
        }
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);

        error!(
            subscriber = %subscriber,
            event_id = %record.original_event.id,
            event_type = %record.original_event.event_type,
            retry_count = record.original_event.retry_count,
            category = %category,
            reason = %record.failure_reason,
            "Event moved to dead-letter channel"
        );

        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize dead-letter record");
                return;
            }
        };
        let original = &record.original_event;
        let mut draft = EventDraft::new(
            event_names::DEAD_LETTER,
            original.tenant_id.clone(),
            original.session_id.clone(),
            payload,
        )
        .with_max_retries(0);
        draft.user_id = original.user_id.clone();
        draft.correlation_id = original.correlation_id.clone();

        let dead_letter_event = draft.into_event(0);
        if let Err(e) = self
            .transport
            .publish(TransportMessage::broadcast(
                self.config.dead_letter_channel.clone(),
                dead_letter_event,
            ))
            .await
        {
            error!(error = %e, "Failed to publish to dead-letter channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..1_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not met in time");
    }

    fn config() -> EventBusConfig {
        EventBusConfig {
            default_max_retries: 2,
            ..EventBusConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_delivers_to_matching_subscribers() {
        let bus = EventBus::in_memory(config());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        bus.subscribe(
            "saga.*",
            handler_fn("collector", move |event: Event| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(event.event_type);
                    Ok(())
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        bus.publish(EventDraft::new("saga.started", "t", "s", json!({})))
            .await
            .unwrap();
        bus.publish(EventDraft::new("pipeline.started", "t", "s", json!({})))
            .await
            .unwrap();
        bus.publish(EventDraft::new("saga.completed", "t", "s", json!({})))
            .await
            .unwrap();

        wait_until(|| received.lock().len() == 2).await;
        assert_eq!(
            *received.lock(),
            vec!["saga.started".to_string(), "saga.completed".to_string()]
        );
        assert_eq!(bus.get_stats().published, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_with_incremented_count() {
        let bus = EventBus::in_memory(config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        bus.subscribe(
            "flaky",
            handler_fn("flaky", move |event: Event| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(event.retry_count);
                    if event.retry_count < 2 {
                        Err(ExternalError::transient("temporarily unavailable"))
                    } else {
                        Ok(())
                    }
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        bus.publish(EventDraft::new("flaky", "t", "s", json!({})))
            .await
            .unwrap();

        wait_until(|| seen.lock().len() == 3).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert!(bus.dead_letters().is_empty());
        assert_eq!(bus.get_stats().retries_scheduled, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_event_goes_to_dead_letter_channel() {
        let bus = EventBus::in_memory(config());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let dead = Arc::new(Mutex::new(Vec::new()));
        let dead_sink = Arc::clone(&dead);

        bus.subscribe(
            "broken",
            handler_fn("broken", move |_event: Event| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ExternalError::transient("still down"))
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();
        bus.subscribe(
            "dead_letter",
            handler_fn("dlq", move |event: Event| {
                let dead_sink = Arc::clone(&dead_sink);
                async move {
                    dead_sink.lock().push(event);
                    Ok(())
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        let event_id = bus
            .publish(EventDraft::new("broken", "t", "s", json!({"n": 1})))
            .await
            .unwrap();

        wait_until(|| dead.lock().len() == 1).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let letter = dead.lock()[0].clone();
        assert_eq!(letter.event_type, "dead_letter");
        assert_eq!(letter.payload["originalEvent"]["id"], json!(event_id));
        assert_eq!(letter.payload["failureReason"], "still down");
        assert!(letter.payload.get("failedAt").is_some());

        let records = bus.dead_letters();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_event.retry_count, 2);
        assert_eq!(records[0].failure_category, "transient");
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_failure_skips_retries() {
        let bus = EventBus::in_memory(config());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        bus.subscribe(
            "secured",
            handler_fn("secured", move |_event: Event| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ExternalError::Unclassified("401 Unauthorized".to_string()))
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        bus.publish(EventDraft::new("secured", "t", "s", json!({})))
            .await
            .unwrap();

        wait_until(|| bus.dead_letters().len() == 1).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(bus.dead_letters()[0].failure_category, "critical");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_uses_fresh_identity() {
        let bus = EventBus::in_memory(EventBusConfig {
            default_max_retries: 0,
            ..EventBusConfig::default()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        bus.subscribe(
            "once",
            handler_fn("once", move |event: Event| {
                let sink = Arc::clone(&sink);
                async move {
                    let first = sink.lock().is_empty();
                    sink.lock().push(event.id);
                    if first {
                        Err(ExternalError::transient("first delivery fails"))
                    } else {
                        Ok(())
                    }
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        let original = bus
            .publish(EventDraft::new("once", "t", "s", json!({"k": "v"})))
            .await
            .unwrap();
        wait_until(|| bus.dead_letters().len() == 1).await;

        let replayed = bus.replay_dead_letter(original).await.unwrap();
        assert_ne!(replayed, original);
        wait_until(|| seen.lock().len() == 2).await;
        assert_eq!(*seen.lock(), vec![original, replayed]);
        assert!(bus.dead_letters().is_empty());
        assert!(bus.replay_dead_letter(original).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::in_memory(config());
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);

        let id = bus
            .subscribe(
                "tick",
                handler_fn("ticker", move |_event: Event| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                SubscriptionOptions::named("ticker"),
            )
            .await
            .unwrap();
        assert_eq!(bus.get_stats().active_subscriptions, 1);
        assert_eq!(bus.subscriptions()[0].name, "ticker");

        bus.publish(EventDraft::new("tick", "t", "s", json!({})))
            .await
            .unwrap();
        wait_until(|| count.load(Ordering::SeqCst) == 1).await;

        bus.unsubscribe(id).await.unwrap();
        assert_eq!(bus.get_stats().active_subscriptions, 0);
        assert!(bus.unsubscribe(id).await.is_err());

        bus.publish(EventDraft::new("tick", "t", "s", json!({})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_preserved_per_handler() {
        let bus = EventBus::in_memory(config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        bus.subscribe(
            "seq",
            handler_fn("seq", move |event: Event| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(event.payload["n"].as_u64().unwrap_or_default());
                    Ok(())
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        for n in 0..20u64 {
            bus.publish(EventDraft::new("seq", "t", "s", json!({ "n": n })))
                .await
                .unwrap();
        }

        wait_until(|| seen.lock().len() == 20).await;
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<u64>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_channel_outside_prefix_is_subscribable() {
        let bus = EventBus::in_memory(EventBusConfig {
            dead_letter_channel: "ops.dead_letter".to_string(),
            default_max_retries: 0,
            ..EventBusConfig::default()
        });
        let dead = Arc::new(Mutex::new(Vec::new()));
        let dead_sink = Arc::clone(&dead);

        bus.subscribe(
            "broken",
            handler_fn("broken", |_event: Event| async move {
                Err(ExternalError::transient("still down"))
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();
        bus.subscribe(
            "ops.dead_letter",
            handler_fn("ops_dlq", move |event: Event| {
                let dead_sink = Arc::clone(&dead_sink);
                async move {
                    dead_sink.lock().push(event);
                    Ok(())
                }
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();

        let patterns: Vec<String> = bus.subscriptions().into_iter().map(|s| s.pattern).collect();
        assert!(patterns.contains(&"ops.dead_letter".to_string()));

        let event_id = bus
            .publish(EventDraft::new("broken", "t", "s", json!({})))
            .await
            .unwrap();

        wait_until(|| dead.lock().len() == 1).await;
        assert_eq!(bus.dead_letters().len(), 1);
        assert_eq!(dead.lock()[0].payload["originalEvent"]["id"], json!(event_id));
    }

    /// Records every requested delay and runs the job straight away
    #[derive(Default)]
    struct RecordingScheduler {
        delays: Mutex<Vec<Duration>>,
    }

    impl DelayScheduler for RecordingScheduler {
        fn schedule(&self, delay: Duration, job: futures::future::BoxFuture<'static, ()>) {
            self.delays.lock().push(delay);
            tokio::spawn(job);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_requests_exponential_delays_with_bounded_jitter() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let config = EventBusConfig {
            default_max_retries: 6,
            base_backoff_ms: 1_000,
            max_jitter_ms: 500,
            ..EventBusConfig::default()
        };
        let bus = EventBus::new(
            config,
            Arc::new(InMemoryTransport::new()),
            scheduler.clone(),
            Arc::new(StandardErrorClassifier::new()),
        );

        bus.subscribe(
            "broken",
            handler_fn("broken", |_event: Event| async move {
                Err(ExternalError::transient("still down"))
            }),
            SubscriptionOptions::default(),
        )
        .await
        .unwrap();
        bus.publish(EventDraft::new("broken", "t", "s", json!({})))
            .await
            .unwrap();

        wait_until(|| bus.dead_letters().len() == 1).await;

        let delays = scheduler.delays.lock().clone();
        assert_eq!(delays.len(), 6);
        let cap = Duration::from_secs(30);
        for (index, delay) in delays.iter().enumerate() {
            let exponential = Duration::from_millis(1_000 << index);
            let lower = exponential.min(cap);
            let upper = (exponential + Duration::from_millis(500)).min(cap);
            assert!(
                *delay >= lower && *delay <= upper,
                "retry {} requested {:?}, expected {:?}..={:?}",
                index + 1,
                delay,
                lower,
                upper
            );
        }
        assert_eq!(delays[5], cap);
        assert_eq!(bus.get_stats().retries_scheduled, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_every_subscription() {
        let bus = EventBus::in_memory(config());
        let count = Arc::new(AtomicU32::new(0));
        for name in ["first", "second"] {
            let counter = Arc::clone(&count);
            bus.subscribe(
                "tick",
                handler_fn(name, move |_event: Event| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                SubscriptionOptions::default(),
            )
            .await
            .unwrap();
        }

        bus.shutdown().await;
        assert!(bus.subscriptions().is_empty());
        assert_eq!(bus.get_stats().active_subscriptions, 0);

        bus.publish(EventDraft::new("tick", "t", "s", json!({})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
