//! Heartbeat monitor wired through the orchestration core and the event bus.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use viralize_core::events::EventDraft;
use viralize_core::models::{AgentStatus, AlertSeverity, HeartbeatData, SystemHealthStatus};
use viralize_core::orchestration::OrchestrationCore;

async fn wait_for_agent(core: &OrchestrationCore, agent_id: &str) {
    for _ in 0..500 {
        if core
            .heartbeat_monitor()
            .agent_status(agent_id)
            .await
            .unwrap()
            .is_some()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("agent {agent_id} never registered");
}

fn core() -> OrchestrationCore {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let (registry, _) = registry_with(&journal, &[]);
    core_with(registry, fast_config())
}

#[tokio::test]
async fn silent_agent_goes_offline_with_a_single_warning() {
    init_tracing();
    let core = core();
    core.start().await.unwrap();

    core.publish(EventDraft::new(
        "agent.heartbeat",
        "tenant-1",
        "session-1",
        json!({"agentId": "agent-7", "responseTimeMs": 120.0, "successRate": 0.99}),
    ))
    .await
    .unwrap();
    wait_for_agent(&core, "agent-7").await;

    let monitor = core.heartbeat_monitor();
    let agent = monitor.agent_status("agent-7").await.unwrap().unwrap();
    assert_eq!(agent.status, AgentStatus::Healthy);

    let later = agent.last_ping + ChronoDuration::seconds(61);
    let health = monitor.run_sweep_at(later).await.unwrap();
    assert_eq!(health.offline, 1);
    assert_eq!(health.status, SystemHealthStatus::Critical);

    monitor
        .run_sweep_at(later + ChronoDuration::seconds(60))
        .await
        .unwrap();

    let warnings: Vec<_> = monitor
        .agent_alerts("agent-7")
        .into_iter()
        .filter(|alert| alert.severity == AlertSeverity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("offline"));
    assert_eq!(
        monitor.agent_status("agent-7").await.unwrap().unwrap().status,
        AgentStatus::Offline
    );

    core.shutdown().await;
}

#[tokio::test]
async fn heartbeat_after_offline_recovers_with_info_alert() {
    let core = core();
    let now = Utc::now();
    let monitor = core.heartbeat_monitor();

    monitor
        .process_heartbeat_at("agent-1", HeartbeatData::new(80.0), now)
        .await
        .unwrap();
    monitor
        .run_sweep_at(now + ChronoDuration::seconds(90))
        .await
        .unwrap();
    let recovered = monitor
        .process_heartbeat_at(
            "agent-1",
            HeartbeatData::new(80.0),
            now + ChronoDuration::seconds(95),
        )
        .await
        .unwrap();

    assert_eq!(recovered.status, AgentStatus::Healthy);
    let stats = core.get_alert_stats();
    assert_eq!(stats.warning, 1);
    assert_eq!(stats.info, 1);

    let statuses: Vec<AgentStatus> = core
        .get_agent_history("agent-1")
        .iter()
        .map(|snapshot| snapshot.status)
        .collect();
    assert_eq!(
        statuses,
        vec![AgentStatus::Healthy, AgentStatus::Offline, AgentStatus::Healthy]
    );
}

#[tokio::test]
async fn system_health_reflects_the_worst_agents() {
    let core = core();
    core.process_heartbeat("fast", HeartbeatData::new(50.0)).await.unwrap();
    core.process_heartbeat("slow", HeartbeatData::new(2_500.0)).await.unwrap();

    let health = core.get_system_health().await.unwrap();
    assert_eq!(health.total_agents, 2);
    assert_eq!(health.healthy, 1);
    assert_eq!(health.degraded, 1);
    assert_eq!(health.status, SystemHealthStatus::Degraded);

    core.process_agent_error("fast", "socket closed").await.unwrap();
    let health = core.get_system_health().await.unwrap();
    assert_eq!(health.degraded, 2);
    assert_eq!(core.get_alert_stats().error, 1);
}

#[tokio::test]
async fn malformed_heartbeat_is_dead_lettered() {
    let core = core();
    core.start().await.unwrap();
    let dead = collect_events(core.event_bus(), "dead_letter").await;

    core.publish(EventDraft::new(
        "agent.heartbeat",
        "tenant-1",
        "session-1",
        json!({"status": "fine"}),
    ))
    .await
    .unwrap();

    wait_until(|| !dead.lock().is_empty()).await;
    let letters = core.event_bus().dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].failure_category, "critical");
    assert_eq!(letters[0].original_event.retry_count, 0);
    assert_eq!(letters[0].subscription, "heartbeat_monitor.heartbeat");

    core.shutdown().await;
}

#[tokio::test]
async fn agent_error_events_degrade_the_agent() {
    let core = core();
    core.start().await.unwrap();

    core.publish(EventDraft::new(
        "agent.error",
        "tenant-1",
        "session-1",
        json!({"agentId": "render-1", "error": "GPU out of memory"}),
    ))
    .await
    .unwrap();
    wait_for_agent(&core, "render-1").await;

    let agent = core
        .heartbeat_monitor()
        .agent_status("render-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Degraded);
    assert_eq!(agent.error_count, 1);
    assert_eq!(agent.last_error.as_deref(), Some("GPU out of memory"));

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn background_sweep_publishes_snapshots_until_shutdown() {
    let core = core();
    let snapshots = collect_events(core.event_bus(), "system.health.snapshot").await;
    core.start().await.unwrap();
    assert!(core.heartbeat_monitor().last_snapshot().is_none());

    tokio::time::sleep(Duration::from_secs(31)).await;
    wait_until(|| !snapshots.lock().is_empty()).await;
    assert!(core.heartbeat_monitor().last_snapshot().is_some());

    core.shutdown().await;
    let seen = snapshots.lock().len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(snapshots.lock().len(), seen);
}
