//! Event bus delivery guarantees across subscriptions.

mod common;

use common::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use viralize_core::config::EventBusConfig;
use viralize_core::events::{handler_fn, Event, EventBus, EventDraft, SubscriptionOptions};
use viralize_core::resilience::ExternalError;

fn bus() -> EventBus {
    EventBus::in_memory(EventBusConfig {
        default_max_retries: 2,
        base_backoff_ms: 1,
        max_jitter_ms: 0,
        ..EventBusConfig::default()
    })
}

fn counting(
    name: &str,
    counter: &Arc<AtomicU32>,
    failure: Option<ExternalError>,
) -> Arc<dyn viralize_core::events::EventHandler> {
    let counter = Arc::clone(counter);
    handler_fn(name.to_string(), move |_event: Event| {
        let counter = Arc::clone(&counter);
        let failure = failure.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            match failure {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn failing_subscriber_does_not_affect_its_neighbours() {
    init_tracing();
    let bus = bus();
    let healthy = Arc::new(AtomicU32::new(0));
    let broken = Arc::new(AtomicU32::new(0));

    bus.subscribe("content.*", counting("healthy", &healthy, None), SubscriptionOptions::default())
        .await
        .unwrap();
    bus.subscribe(
        "content.ready",
        counting("broken", &broken, Some(ExternalError::transient("downstream busy"))),
        SubscriptionOptions::default(),
    )
    .await
    .unwrap();

    bus.publish(EventDraft::new("content.ready", "tenant-1", "session-1", json!({"id": 1})))
        .await
        .unwrap();

    wait_until(|| bus.dead_letters().len() == 1).await;
    assert_eq!(healthy.load(Ordering::SeqCst), 1);
    assert_eq!(broken.load(Ordering::SeqCst), 3);
    assert_eq!(bus.dead_letters()[0].subscription, "broken");

    let stats = bus.get_stats();
    assert_eq!(stats.retries_scheduled, 2);
    assert_eq!(stats.dead_lettered, 1);
}

#[tokio::test(start_paused = true)]
async fn subscription_budget_overrides_the_event_budget() {
    let bus = bus();
    let attempts = Arc::new(AtomicU32::new(0));
    bus.subscribe(
        "render",
        counting("render", &attempts, Some(ExternalError::transient("busy"))),
        SubscriptionOptions::named("render").with_max_retries(0),
    )
    .await
    .unwrap();

    bus.publish(EventDraft::new("render", "t", "s", json!({})).with_max_retries(5))
        .await
        .unwrap();

    wait_until(|| bus.dead_letters().len() == 1).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(bus.dead_letters()[0].original_event.max_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn retry_disabled_subscription_drops_failures() {
    let bus = bus();
    let attempts = Arc::new(AtomicU32::new(0));
    bus.subscribe(
        "metrics.tick",
        counting("metrics", &attempts, Some(ExternalError::transient("sink full"))),
        SubscriptionOptions::named("metrics").without_retry(),
    )
    .await
    .unwrap();

    bus.publish(EventDraft::new("metrics.tick", "t", "s", json!({})))
        .await
        .unwrap();
    wait_until(|| attempts.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(bus.dead_letters().is_empty());
    assert_eq!(bus.get_stats().failed_deliveries, 1);
}

#[tokio::test(start_paused = true)]
async fn replayed_event_meets_the_same_classification() {
    let bus = bus();
    let attempts = Arc::new(AtomicU32::new(0));
    let dead = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&dead);

    bus.subscribe(
        "billing.charge",
        counting("billing", &attempts, Some(ExternalError::critical("card declined"))),
        SubscriptionOptions::default(),
    )
    .await
    .unwrap();
    bus.subscribe(
        "dead_letter",
        handler_fn("dlq", move |event: Event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event);
                Ok(())
            }
        }),
        SubscriptionOptions::default(),
    )
    .await
    .unwrap();

    let original = bus
        .publish(
            EventDraft::new("billing.charge", "tenant-9", "session-9", json!({"amount": 5}))
                .with_correlation_id("order-42"),
        )
        .await
        .unwrap();
    wait_until(|| dead.lock().len() == 1).await;

    let replayed = bus.replay_dead_letter(original).await.unwrap();
    wait_until(|| dead.lock().len() == 2).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let letters = bus.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].original_event.id, replayed);
    assert_eq!(letters[0].failure_category, "critical");

    let wrappers = dead.lock();
    assert!(wrappers.iter().all(|event| event.tenant_id == "tenant-9"));
    assert!(wrappers
        .iter()
        .all(|event| event.correlation_id.as_deref() == Some("order-42")));
    assert_eq!(wrappers[1].payload["originalEvent"]["payload"]["amount"], json!(5));
}

#[tokio::test]
async fn facade_subscribe_and_unsubscribe() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let (registry, _) = registry_with(&journal, &[]);
    let core = core_with(registry, fast_config());
    let count = Arc::new(AtomicU32::new(0));

    let id = core
        .subscribe("campaign.*", counting("campaign", &count, None), SubscriptionOptions::default())
        .await
        .unwrap();
    core.publish(EventDraft::new("campaign.launched", "t", "s", json!({})))
        .await
        .unwrap();
    wait_until(|| count.load(Ordering::SeqCst) == 1).await;

    core.unsubscribe(id).await.unwrap();
    assert!(core.unsubscribe(id).await.is_err());
    core.publish(EventDraft::new("campaign.launched", "t", "s", json!({})))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
