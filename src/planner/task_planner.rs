//! # Task Planner
//!
//! Turns a trend analysis into a prioritized, dependency-ordered plan.
//!
//! ## Algorithm
//!
//! 1. Validate the analysis ([`TrendAnalysis::from_value`]); nothing is derived
//!    from malformed input.
//! 2. Derive candidate actions from threshold rules.
//! 3. Order them topologically ([`order_actions`]); cycles and dangling
//!    dependencies are rejected.
//! 4. Score the plan: resources, confidence, priority and risks.
//!
//! Planning is pure apart from id generation and reading the clock.

use super::analysis::TrendAnalysis;
use super::dependency::order_actions;
use super::scoring;
use crate::config::PlannerConfig;
use crate::constants::system::PLANNER_VERSION;
use crate::error::Result;
use crate::models::{Action, ActionType, Plan, PlanStatus, PlanningResult};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct TaskPlanner {
    config: PlannerConfig,
}

impl TaskPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Validate a raw camelCase analysis and plan from it
    #[instrument(skip(self, analysis))]
    pub fn generate_plan(
        &self,
        tenant_id: &str,
        session_id: &str,
        analysis: &Value,
    ) -> Result<PlanningResult> {
        let analysis = TrendAnalysis::from_value(analysis)?;
        self.plan_for(tenant_id, session_id, &analysis)
    }

    /// Plan from an already-typed analysis
    pub fn plan_for(
        &self,
        tenant_id: &str,
        session_id: &str,
        analysis: &TrendAnalysis,
    ) -> Result<PlanningResult> {
        analysis.validate()?;

        let candidates = self.candidate_actions(analysis);
        debug!(candidates = candidates.len(), "Derived candidate actions");
        let actions = order_actions(candidates)?;

        let resource_requirements = scoring::resource_requirements(&self.config, &actions);
        let confidence_score = scoring::confidence_score(&self.config, analysis, actions.len());
        let priority = scoring::plan_priority(&self.config, analysis);
        let risks = scoring::identify_risks(&self.config, analysis, actions.len());

        let created_at = Utc::now();
        let total_ms = i64::try_from(resource_requirements.total_duration_ms).unwrap_or(i64::MAX);
        let estimated_completion = created_at + ChronoDuration::milliseconds(total_ms);

        let plan = Plan {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            created_at,
            estimated_completion,
            actions,
            priority,
            status: PlanStatus::Planned,
            metadata: json!({
                "plannerVersion": PLANNER_VERSION,
                "competitionLevel": analysis.competition_level,
                "engagementRate": analysis.engagement_rate,
                "audienceSize": analysis.audience_size,
                "platform": analysis.platform,
            }),
        };

        info!(
            plan_id = %plan.id,
            actions = plan.actions.len(),
            priority = plan.priority,
            confidence = confidence_score,
            risks = risks.len(),
            "Generated plan"
        );

        Ok(PlanningResult {
            plan,
            confidence_score,
            resource_requirements,
            risks,
        })
    }

    /// Candidate actions in derivation order; ordering happens afterwards
    pub fn candidate_actions(&self, analysis: &TrendAnalysis) -> Vec<Action> {
        let mut actions = Vec::new();

        if scoring::is_large_audience(&self.config, analysis) {
            actions.push(Action::new(
                ActionType::AudienceAnalysis,
                json!({
                    "audienceSize": analysis.audience_size,
                    "platform": analysis.platform,
                }),
            ));
        }

        if let Some(format) = self.video_format(analysis) {
            actions.push(Action::new(
                ActionType::ContentCreation,
                json!({
                    "format": format,
                    "trendingTopics": analysis.trending_topics,
                }),
            ));
        }

        if !analysis.is_high_competition() {
            actions.push(Action::new(
                ActionType::ContentGeneration,
                json!({
                    "contentTypes": analysis.content_types,
                    "trendingTopics": analysis.trending_topics,
                }),
            ));
        }

        let timing = Action::new(
            ActionType::TimingOptimization,
            json!({
                "peakHours": analysis.peak_hours,
                "platform": analysis.platform,
            }),
        );
        let scheduling = Action::new(
            ActionType::Scheduling,
            json!({ "platform": analysis.platform }),
        )
        .depends_on(timing.id);

        actions.push(timing);
        actions.push(scheduling);
        actions
    }

    /// First video-eligible content type, if engagement warrants video
    fn video_format<'a>(&self, analysis: &'a TrendAnalysis) -> Option<&'a str> {
        if !scoring::is_high_engagement(&self.config, analysis) {
            return None;
        }
        analysis
            .content_types
            .iter()
            .find(|kind| self.config.video_content_types.contains(kind))
            .map(String::as_str)
    }
}
