//! # Health Models
//!
//! Agent health records, alerts and the aggregate system health snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Offline,
}

impl AgentStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Heartbeat payload reported by a worker or stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatData {
    pub response_time_ms: f64,
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub uptime_seconds: Option<u64>,
    #[serde(default)]
    pub metrics: Value,
}

impl HeartbeatData {
    pub fn new(response_time_ms: f64) -> Self {
        Self {
            response_time_ms,
            success_rate: None,
            error_rate: None,
            uptime_seconds: None,
            metrics: Value::Null,
        }
    }

    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = Some(success_rate);
        self
    }

    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = Some(error_rate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealthStatus {
    pub agent_id: String,
    pub status: AgentStatus,
    pub last_ping: DateTime<Utc>,
    pub response_time_ms: f64,
    pub uptime_seconds: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub metrics: Value,
}

/// One entry of an agent's bounded history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub timestamp: DateTime<Utc>,
    pub status: AgentStatus,
    pub response_time_ms: f64,
    pub error_count: u64,
}

impl From<&AgentHealthStatus> for AgentSnapshot {
    fn from(status: &AgentHealthStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.status,
            response_time_ms: status.response_time_ms,
            error_count: status.error_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub message: String,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl HealthAlert {
    pub fn new(
        severity: AlertSeverity,
        message: impl Into<String>,
        agent_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            message: message.into(),
            agent_id: agent_id.map(str::to_string),
            timestamp: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: SystemHealthStatus,
    pub total_agents: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub offline: usize,
    pub average_response_time_ms: f64,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
}

impl AlertStats {
    pub fn record(&mut self, alert: &HealthAlert) {
        self.total += 1;
        if alert.resolved {
            self.resolved += 1;
        } else {
            self.active += 1;
        }
        match alert.severity {
            AlertSeverity::Info => self.info += 1,
            AlertSeverity::Warning => self.warning += 1,
            AlertSeverity::Error => self.error += 1,
            AlertSeverity::Critical => self.critical += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_payload_defaults() {
        let data: HeartbeatData = serde_json::from_value(json!({"responseTimeMs": 120.0})).unwrap();
        assert_eq!(data.response_time_ms, 120.0);
        assert!(data.success_rate.is_none());
        assert_eq!(data.metrics, Value::Null);
    }

    #[test]
    fn test_alert_stats() {
        let mut stats = AlertStats::default();
        let mut resolved = HealthAlert::new(AlertSeverity::Warning, "slow", Some("a1"));
        resolved.resolved = true;
        stats.record(&resolved);
        stats.record(&HealthAlert::new(AlertSeverity::Critical, "down", None));

        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.warning, 1);
        assert_eq!(stats.critical, 1);
    }
}
