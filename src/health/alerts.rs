//! In-memory alert book.
//!
//! Alerts are appended as rules fire; there is no deduplication, so repeated
//! breaches produce repeated alerts. Resolved alerts are collected once they are
//! older than the configured retention.

use crate::models::{AlertSeverity, AlertStats, HealthAlert};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct AlertBook {
    alerts: RwLock<Vec<HealthAlert>>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(
        &self,
        severity: AlertSeverity,
        message: impl Into<String>,
        agent_id: Option<&str>,
    ) -> HealthAlert {
        let alert = HealthAlert::new(severity, message, agent_id);
        self.alerts.write().push(alert.clone());
        alert
    }

    /// Mark an alert resolved; `None` when the id is unknown
    pub fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> Option<HealthAlert> {
        let mut alerts = self.alerts.write();
        let alert = alerts.iter_mut().find(|alert| alert.id == id)?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(at);
        }
        Some(alert.clone())
    }

    /// Drop resolved alerts resolved before `cutoff`, returning how many were dropped
    pub fn collect_resolved(&self, cutoff: DateTime<Utc>) -> usize {
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|alert| {
            !matches!(alert.resolved_at, Some(at) if alert.resolved && at < cutoff)
        });
        before - alerts.len()
    }

    pub fn active(&self) -> Vec<HealthAlert> {
        self.alerts
            .read()
            .iter()
            .filter(|alert| !alert.resolved)
            .cloned()
            .collect()
    }

    pub fn active_count(&self, severity: Option<AlertSeverity>) -> usize {
        self.alerts
            .read()
            .iter()
            .filter(|alert| !alert.resolved && severity.map_or(true, |s| alert.severity == s))
            .count()
    }

    /// Alerts concerning one agent, oldest first
    pub fn for_agent(&self, agent_id: &str) -> Vec<HealthAlert> {
        self.alerts
            .read()
            .iter()
            .filter(|alert| alert.agent_id.as_deref() == Some(agent_id))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> AlertStats {
        let mut stats = AlertStats::default();
        for alert in self.alerts.read().iter() {
            stats.record(alert);
        }
        stats
    }
}
