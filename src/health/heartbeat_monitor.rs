//! # Heartbeat Monitor
//!
//! Tracks agent health from heartbeats and error reports, raises rule-based
//! alerts and periodically publishes an aggregate [`SystemHealth`] snapshot.
//!
//! ## Status derivation
//!
//! A heartbeat is classified against [`HeartbeatConfig`] thresholds on response
//! time, success rate and error rate; the worst breached band wins. An agent that
//! has not pinged for `offline_after_seconds` is marked offline by the sweep.
//!
//! ## Alert rules
//!
//! | Trigger                         | Severity   |
//! |---------------------------------|------------|
//! | unhealthy heartbeat             | `critical` |
//! | degraded heartbeat              | `warning`  |
//! | reported agent error            | `error`    |
//! | transition into offline         | `warning`  |
//! | heartbeat after being offline   | `info`     |
//!
//! Alerts are not deduplicated. The offline alert fires on the transition only, so
//! an agent that stays silent yields exactly one.

use super::alerts::AlertBook;
use crate::config::HeartbeatConfig;
use crate::constants::events as event_names;
use crate::error::{CoreError, Result};
use crate::events::{handler_fn, EventBus, EventDraft, SubscriptionId, SubscriptionOptions};
use crate::models::{
    AgentHealthStatus, AgentSnapshot, AgentStatus, AlertSeverity, AlertStats, HealthAlert,
    HeartbeatData, SystemHealth, SystemHealthStatus,
};
use crate::resilience::ExternalError;
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const SYSTEM_TENANT: &str = "system";
const MONITOR_SESSION: &str = "heartbeat_monitor";

pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    agents: Arc<dyn KeyValueStore<String, AgentHealthStatus>>,
    history: DashMap<String, VecDeque<AgentSnapshot>>,
    alerts: AlertBook,
    event_bus: EventBus,
    last_snapshot: RwLock<Option<SystemHealth>>,
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("config", &self.config)
            .field("tracked_history", &self.history.len())
            .finish()
    }
}

impl HeartbeatMonitor {
    pub fn new(
        config: HeartbeatConfig,
        agents: Arc<dyn KeyValueStore<String, AgentHealthStatus>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            agents,
            history: DashMap::new(),
            alerts: AlertBook::new(),
            event_bus,
            last_snapshot: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub async fn process_heartbeat(
        &self,
        agent_id: &str,
        data: HeartbeatData,
    ) -> Result<AgentHealthStatus> {
        self.process_heartbeat_at(agent_id, data, Utc::now()).await
    }

    /// [`Self::process_heartbeat`] with an explicit receive time
    #[instrument(skip(self, data))]
    pub async fn process_heartbeat_at(
        &self,
        agent_id: &str,
        data: HeartbeatData,
        now: DateTime<Utc>,
    ) -> Result<AgentHealthStatus> {
        if agent_id.is_empty() {
            return Err(CoreError::validation("agentId", "must not be empty"));
        }
        let (status, reasons) = self.evaluate(&data);

        let previous = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&previous);
        let record = self
            .agents
            .upsert(
                agent_id.to_string(),
                new_agent(agent_id, now),
                Box::new(move |agent: &mut AgentHealthStatus| {
                    *seen.lock() = Some(agent.status);
                    agent.status = status;
                    agent.last_ping = now;
                    agent.response_time_ms = data.response_time_ms;
                    if let Some(uptime) = data.uptime_seconds {
                        agent.uptime_seconds = uptime;
                    }
                    if !data.metrics.is_null() {
                        agent.metrics = data.metrics;
                    }
                }),
            )
            .await?;
        let previous = *previous.lock();

        self.push_history(&record, now);
        debug!(
            agent_id,
            status = %record.status,
            response_time_ms = record.response_time_ms,
            "Heartbeat processed"
        );

        if previous == Some(AgentStatus::Offline) {
            self.raise(
                AlertSeverity::Info,
                format!("Agent {agent_id} is back online"),
                Some(agent_id),
            )
            .await;
        }
        match status {
            AgentStatus::Unhealthy => {
                self.raise(
                    AlertSeverity::Critical,
                    format!("Agent {agent_id} is unhealthy: {}", reasons.join(", ")),
                    Some(agent_id),
                )
                .await;
            }
            AgentStatus::Degraded => {
                self.raise(
                    AlertSeverity::Warning,
                    format!("Agent {agent_id} is degraded: {}", reasons.join(", ")),
                    Some(agent_id),
                )
                .await;
            }
            AgentStatus::Healthy | AgentStatus::Offline => {}
        }
        Ok(record)
    }

    /// Count an error against the agent and force it to `degraded`
    #[instrument(skip(self))]
    pub async fn process_agent_error(
        &self,
        agent_id: &str,
        error: &str,
    ) -> Result<AgentHealthStatus> {
        if agent_id.is_empty() {
            return Err(CoreError::validation("agentId", "must not be empty"));
        }
        let now = Utc::now();
        let message = error.to_string();
        let record = self
            .agents
            .upsert(
                agent_id.to_string(),
                new_agent(agent_id, now),
                Box::new(move |agent: &mut AgentHealthStatus| {
                    agent.error_count += 1;
                    agent.last_error = Some(message);
                    agent.status = AgentStatus::Degraded;
                }),
            )
            .await?;

        self.push_history(&record, now);
        warn!(agent_id, error_count = record.error_count, error, "Agent reported an error");
        self.raise(
            AlertSeverity::Error,
            format!("Agent {agent_id} reported an error: {error}"),
            Some(agent_id),
        )
        .await;
        Ok(record)
    }

    pub async fn run_sweep(&self) -> Result<SystemHealth> {
        self.run_sweep_at(Utc::now()).await
    }

    /// Mark silent agents offline, collect old resolved alerts and publish a snapshot
    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> Result<SystemHealth> {
        let offline_after = self.config.offline_after();
        let all = |_: &AgentHealthStatus| true;
        let agents = self.agents.scan(&all).await?;

        for agent in agents
            .iter()
            .filter(|agent| goes_offline(agent, now, offline_after))
        {
            let transitioned = Arc::new(Mutex::new(false));
            let flag = Arc::clone(&transitioned);
            let updated = self
                .agents
                .update(
                    &agent.agent_id,
                    Box::new(move |agent: &mut AgentHealthStatus| {
                        // a heartbeat may have landed since the scan
                        if goes_offline(agent, now, offline_after) {
                            agent.status = AgentStatus::Offline;
                            *flag.lock() = true;
                        }
                    }),
                )
                .await?;

            let transitioned = *transitioned.lock();
            if let (true, Some(record)) = (transitioned, updated) {
                self.push_history(&record, now);
                let silence = (now - record.last_ping).num_seconds();
                self.raise(
                    AlertSeverity::Warning,
                    format!("Agent {} is offline: no heartbeat for {silence}s", record.agent_id),
                    Some(&record.agent_id),
                )
                .await;
            }
        }

        let retention = chrono::Duration::from_std(self.config.alert_retention())
            .unwrap_or_else(|_| chrono::Duration::weeks(52));
        let collected = self.alerts.collect_resolved(now - retention);
        if collected > 0 {
            debug!(collected, "Collected resolved alerts");
        }

        let snapshot = self.compute_system_health(now).await?;
        *self.last_snapshot.write() = Some(snapshot.clone());

        match serde_json::to_value(&snapshot) {
            Ok(payload) => {
                self.event_bus
                    .publish_quietly(EventDraft::new(
                        event_names::SYSTEM_HEALTH_SNAPSHOT,
                        SYSTEM_TENANT,
                        MONITOR_SESSION,
                        payload,
                    ))
                    .await;
            }
            Err(e) => warn!(error = %e, "Failed to serialize health snapshot"),
        }
        Ok(snapshot)
    }

    pub async fn get_system_health(&self) -> Result<SystemHealth> {
        self.compute_system_health(Utc::now()).await
    }

    /// Snapshot produced by the most recent sweep
    pub fn last_snapshot(&self) -> Option<SystemHealth> {
        self.last_snapshot.read().clone()
    }

    pub fn get_alert_stats(&self) -> AlertStats {
        self.alerts.stats()
    }

    /// Bounded status history for one agent, oldest first
    pub fn get_agent_history(&self, agent_id: &str) -> Vec<AgentSnapshot> {
        self.history
            .get(agent_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn agent_status(&self, agent_id: &str) -> Result<Option<AgentHealthStatus>> {
        Ok(self.agents.get(&agent_id.to_string()).await?)
    }

    pub fn active_alerts(&self) -> Vec<HealthAlert> {
        self.alerts.active()
    }

    pub fn agent_alerts(&self, agent_id: &str) -> Vec<HealthAlert> {
        self.alerts.for_agent(agent_id)
    }

    pub fn resolve_alert(&self, alert_id: Uuid) -> Result<HealthAlert> {
        self.alerts
            .resolve(alert_id, Utc::now())
            .ok_or_else(|| CoreError::NotFound {
                entity: "Alert".to_string(),
                id: alert_id.to_string(),
            })
    }

    /// Spawn the periodic sweep
    ///
    /// The task holds only a weak reference, so dropping the last `Arc` also
    /// ends it.
    pub fn start(self: Arc<Self>) -> MonitorHandle {
        let shutdown = Arc::new(Notify::new());
        let period = self.config.sweep_interval();
        let weak = Arc::downgrade(&self);
        drop(self);

        let task = tokio::spawn(sweep_loop(weak, period, Arc::clone(&shutdown)));
        info!(interval_seconds = period.as_secs(), "Heartbeat sweep started");
        MonitorHandle { shutdown, task }
    }

    /// Feed `agent.heartbeat` and `agent.error` events from the bus into this monitor
    ///
    /// Heartbeat payloads carry `agentId` next to the [`HeartbeatData`] fields;
    /// error payloads carry `agentId` and `error`. A malformed payload is a
    /// critical handler failure and goes straight to the dead-letter channel.
    pub async fn attach(self: &Arc<Self>, bus: &EventBus) -> Result<Vec<SubscriptionId>> {
        let monitor = Arc::downgrade(self);
        let heartbeat = bus
            .subscribe(
                event_names::AGENT_HEARTBEAT,
                handler_fn("heartbeat_monitor.heartbeat", move |event| {
                    let monitor = monitor.clone();
                    async move {
                        let Some(monitor) = monitor.upgrade() else {
                            return Ok(());
                        };
                        let report: HeartbeatReport = parse_payload(event.payload)?;
                        monitor
                            .process_heartbeat(&report.agent_id, report.data)
                            .await
                            .map(|_| ())
                            .map_err(|e| ExternalError::critical(e.to_string()))
                    }
                }),
                SubscriptionOptions::named("heartbeat_monitor.heartbeat"),
            )
            .await?;

        let monitor = Arc::downgrade(self);
        let errors = bus
            .subscribe(
                event_names::AGENT_ERROR,
                handler_fn("heartbeat_monitor.error", move |event| {
                    let monitor = monitor.clone();
                    async move {
                        let Some(monitor) = monitor.upgrade() else {
                            return Ok(());
                        };
                        let report: ErrorReport = parse_payload(event.payload)?;
                        monitor
                            .process_agent_error(&report.agent_id, &report.error)
                            .await
                            .map(|_| ())
                            .map_err(|e| ExternalError::critical(e.to_string()))
                    }
                }),
                SubscriptionOptions::named("heartbeat_monitor.error"),
            )
            .await?;

        Ok(vec![heartbeat, errors])
    }

    fn evaluate(&self, data: &HeartbeatData) -> (AgentStatus, Vec<String>) {
        let c = &self.config;
        let mut unhealthy = Vec::new();
        let mut degraded = Vec::new();

        let rt = data.response_time_ms;
        if rt > c.unhealthy_response_time_ms {
            unhealthy.push(format!("response time {rt:.0}ms"));
        } else if rt > c.degraded_response_time_ms {
            degraded.push(format!("response time {rt:.0}ms"));
        }
        if let Some(rate) = data.success_rate {
            if rate < c.unhealthy_success_rate {
                unhealthy.push(format!("success rate {:.1}%", rate * 100.0));
            } else if rate < c.degraded_success_rate {
                degraded.push(format!("success rate {:.1}%", rate * 100.0));
            }
        }
        if let Some(rate) = data.error_rate {
            if rate > c.unhealthy_error_rate {
                unhealthy.push(format!("error rate {:.1}%", rate * 100.0));
            } else if rate > c.degraded_error_rate {
                degraded.push(format!("error rate {:.1}%", rate * 100.0));
            }
        }

        if !unhealthy.is_empty() {
            (AgentStatus::Unhealthy, unhealthy)
        } else if !degraded.is_empty() {
            (AgentStatus::Degraded, degraded)
        } else {
            (AgentStatus::Healthy, Vec::new())
        }
    }

    async fn compute_system_health(&self, now: DateTime<Utc>) -> Result<SystemHealth> {
        let all = |_: &AgentHealthStatus| true;
        let agents = self.agents.scan(&all).await?;

        let count = |status: AgentStatus| agents.iter().filter(|a| a.status == status).count();
        let healthy = count(AgentStatus::Healthy);
        let degraded = count(AgentStatus::Degraded);
        let unhealthy = count(AgentStatus::Unhealthy);
        let offline = count(AgentStatus::Offline);
        let total_agents = agents.len();

        let average_response_time_ms = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.response_time_ms).sum::<f64>() / total_agents as f64
        };
        let active_alerts = self.alerts.active_count(None);
        let critical_alerts = self.alerts.active_count(Some(AlertSeverity::Critical));

        let status = if critical_alerts > 0 || (unhealthy + offline) * 2 > total_agents {
            SystemHealthStatus::Critical
        } else if healthy < total_agents {
            SystemHealthStatus::Degraded
        } else {
            SystemHealthStatus::Healthy
        };

        Ok(SystemHealth {
            status,
            total_agents,
            healthy,
            degraded,
            unhealthy,
            offline,
            average_response_time_ms,
            active_alerts,
            critical_alerts,
            timestamp: now,
        })
    }

    fn push_history(&self, record: &AgentHealthStatus, now: DateTime<Utc>) {
        let mut snapshot = AgentSnapshot::from(record);
        snapshot.timestamp = now;

        let mut history = self.history.entry(record.agent_id.clone()).or_default();
        history.push_back(snapshot);
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    async fn raise(
        &self,
        severity: AlertSeverity,
        message: String,
        agent_id: Option<&str>,
    ) -> HealthAlert {
        let alert = self.alerts.raise(severity, message, agent_id);
        match severity {
            AlertSeverity::Critical | AlertSeverity::Error => {
                error!(
                    alert_id = %alert.id,
                    severity = %severity,
                    agent_id,
                    message = %alert.message,
                    "Health alert"
                )
            }
            AlertSeverity::Warning => {
                warn!(alert_id = %alert.id, agent_id, message = %alert.message, "Health alert")
            }
            AlertSeverity::Info => {
                info!(alert_id = %alert.id, agent_id, message = %alert.message, "Health alert")
            }
        }

        self.event_bus
            .publish_quietly(EventDraft::new(
                event_names::HEALTH_ALERT_RAISED,
                SYSTEM_TENANT,
                MONITOR_SESSION,
                json!({
                    "alertId": alert.id,
                    "severity": alert.severity,
                    "message": alert.message,
                    "agentId": alert.agent_id,
                }),
            ))
            .await;
        alert
    }
}

/// Stops the background sweep started by [`HeartbeatMonitor::start`]
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Heartbeat sweep task ended abnormally");
        }
    }
}

async fn sweep_loop(
    monitor: Weak<HeartbeatMonitor>,
    period: std::time::Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.notified() => {
                debug!("Heartbeat sweep received shutdown");
                break;
            }
        }

        let Some(monitor) = monitor.upgrade() else {
            debug!("Heartbeat monitor dropped, stopping sweep");
            break;
        };
        if let Err(e) = monitor.run_sweep().await {
            error!(error = %e, "Heartbeat sweep failed");
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatReport {
    agent_id: String,
    #[serde(flatten)]
    data: HeartbeatData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport {
    agent_id: String,
    error: String,
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: Value,
) -> std::result::Result<T, ExternalError> {
    serde_json::from_value(payload)
        .map_err(|e| ExternalError::critical(format!("invalid input: {e}")))
}

fn new_agent(agent_id: &str, now: DateTime<Utc>) -> AgentHealthStatus {
    AgentHealthStatus {
        agent_id: agent_id.to_string(),
        status: AgentStatus::Healthy,
        last_ping: now,
        response_time_ms: 0.0,
        uptime_seconds: 0,
        error_count: 0,
        last_error: None,
        metrics: Value::Null,
    }
}

/// Silent for longer than `offline_after` and not already marked offline
fn goes_offline(
    agent: &AgentHealthStatus,
    now: DateTime<Utc>,
    offline_after: std::time::Duration,
) -> bool {
    agent.status != AgentStatus::Offline
        && (now - agent.last_ping)
            .to_std()
            .map_or(false, |silence| silence > offline_after)
}
