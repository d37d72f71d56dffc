//! # Plan Model
//!
//! Output of the task planner: an ordered, dependency-respecting set of actions
//! with priority, confidence and risk metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub type ActionId = Uuid;

/// Kinds of work the planner knows how to schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AudienceAnalysis,
    TimingOptimization,
    /// Video content creation
    ContentCreation,
    /// Generic (text) content generation
    ContentGeneration,
    Scheduling,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AudienceAnalysis => "audience_analysis",
            Self::TimingOptimization => "timing_optimization",
            Self::ContentCreation => "content_creation",
            Self::ContentGeneration => "content_generation",
            Self::Scheduling => "scheduling",
        }
    }

    /// Lower runs first
    pub fn default_priority(&self) -> u8 {
        match self {
            Self::AudienceAnalysis => 1,
            Self::TimingOptimization => 2,
            Self::ContentCreation | Self::ContentGeneration => 3,
            Self::Scheduling => 4,
        }
    }

    pub fn default_duration(&self) -> Duration {
        let minutes = match self {
            Self::AudienceAnalysis => 5,
            Self::TimingOptimization => 2,
            Self::ContentCreation => 30,
            Self::ContentGeneration => 10,
            Self::Scheduling => 1,
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn required_capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::AudienceAnalysis | Self::TimingOptimization => &["analytics"],
            Self::ContentCreation => &["video_generation", "content_creation"],
            Self::ContentGeneration => &["text_generation"],
            Self::Scheduling => &["scheduling", "publishing"],
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audience_analysis" => Ok(Self::AudienceAnalysis),
            "timing_optimization" => Ok(Self::TimingOptimization),
            "content_creation" => Ok(Self::ContentCreation),
            "content_generation" => Ok(Self::ContentGeneration),
            "scheduling" => Ok(Self::Scheduling),
            _ => Err(format!("Invalid action type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Compensated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub action_type: ActionType,
    pub priority: u8,
    pub estimated_duration_ms: u64,
    pub required_capabilities: Vec<String>,
    pub dependencies: Vec<ActionId>,
    pub parameters: Value,
    pub status: ActionStatus,
    pub result: Option<Value>,
}

impl Action {
    /// Action with the type's default priority, duration and capabilities
    pub fn new(action_type: ActionType, parameters: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            priority: action_type.default_priority(),
            estimated_duration_ms: action_type.default_duration().as_millis() as u64,
            required_capabilities: action_type
                .required_capabilities()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            dependencies: Vec::new(),
            parameters,
            status: ActionStatus::Pending,
            result: None,
        }
    }

    pub fn depends_on(mut self, dependency: ActionId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_millis(self.estimated_duration_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Planned,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub tenant_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
    pub actions: Vec<Action>,
    /// 1 (most urgent) to 5
    pub priority: u8,
    pub status: PlanStatus,
    pub metadata: Value,
}

impl Plan {
    /// Whether every action appears after all of its dependencies
    pub fn is_dependency_ordered(&self) -> bool {
        let mut placed = HashSet::with_capacity(self.actions.len());
        for action in &self.actions {
            if !action.dependencies.iter().all(|dep| placed.contains(dep)) {
                return false;
            }
            placed.insert(action.id);
        }
        true
    }

    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.iter().find(|action| action.id == id)
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.actions.iter().map(|a| a.estimated_duration_ms).sum())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    HighCompetition,
    ComplexPlan,
    SmallAudience,
    NegativeSentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub kind: RiskKind,
    pub level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Sorted, deduplicated
    pub capabilities: Vec<String>,
    pub total_duration_ms: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    pub plan: Plan,
    pub confidence_score: f64,
    pub resource_requirements: ResourceRequirements,
    pub risks: Vec<Risk>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan_with(actions: Vec<Action>) -> Plan {
        let now = Utc::now();
        Plan {
            id: Uuid::new_v4(),
            tenant_id: "t".to_string(),
            session_id: "s".to_string(),
            created_at: now,
            estimated_completion: now,
            actions,
            priority: 3,
            status: PlanStatus::Planned,
            metadata: json!({}),
        }
    }

    #[test]
    fn test_action_defaults_follow_type() {
        let action = Action::new(ActionType::ContentCreation, json!({}));
        assert_eq!(action.priority, 3);
        assert_eq!(action.estimated_duration(), Duration::from_secs(1_800));
        assert_eq!(
            action.required_capabilities,
            vec!["video_generation".to_string(), "content_creation".to_string()]
        );
    }

    #[test]
    fn test_dependency_order_check() {
        let timing = Action::new(ActionType::TimingOptimization, json!({}));
        let scheduling = Action::new(ActionType::Scheduling, json!({})).depends_on(timing.id);

        let ordered = plan_with(vec![timing.clone(), scheduling.clone()]);
        assert!(ordered.is_dependency_ordered());

        let reversed = plan_with(vec![scheduling, timing]);
        assert!(!reversed.is_dependency_ordered());
    }

    #[test]
    fn test_action_type_round_trip() {
        for kind in [
            ActionType::AudienceAnalysis,
            ActionType::TimingOptimization,
            ActionType::ContentCreation,
            ActionType::ContentGeneration,
            ActionType::Scheduling,
        ] {
            assert_eq!(kind.as_str().parse::<ActionType>().unwrap(), kind);
        }
    }
}
