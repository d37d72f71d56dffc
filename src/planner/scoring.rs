//! # Plan Scoring
//!
//! Confidence, priority, risk and resource estimates derived from an analysis and
//! the planned actions. All functions are pure.

use super::analysis::{CompetitionLevel, TrendAnalysis};
use crate::config::PlannerConfig;
use crate::models::{Action, ResourceRequirements, Risk, RiskKind, RiskLevel};
use std::collections::BTreeSet;

const BASE_CONFIDENCE: f64 = 0.5;
const HIGH_ENGAGEMENT_BONUS: f64 = 0.1;
const LARGE_AUDIENCE_BONUS: f64 = 0.1;
const LOW_COMPETITION_BONUS: f64 = 0.1;
const POSITIVE_SENTIMENT_BONUS: f64 = 0.05;
const HIGH_COMPETITION_PENALTY: f64 = 0.15;
const COMPLEX_PLAN_PENALTY: f64 = 0.1;
const COMPLEX_PLAN_ACTIONS: usize = 5;
const RISKY_PLAN_ACTIONS: usize = 4;

pub fn is_high_engagement(config: &PlannerConfig, analysis: &TrendAnalysis) -> bool {
    analysis.engagement_rate > config.high_engagement_threshold
}

pub fn is_large_audience(config: &PlannerConfig, analysis: &TrendAnalysis) -> bool {
    analysis.audience_size > config.large_audience_threshold
}

/// Confidence in `[0, 1]` that the plan will perform
pub fn confidence_score(
    config: &PlannerConfig,
    analysis: &TrendAnalysis,
    action_count: usize,
) -> f64 {
    let mut score = BASE_CONFIDENCE;

    if is_high_engagement(config, analysis) {
        score += HIGH_ENGAGEMENT_BONUS;
    }
    if is_large_audience(config, analysis) {
        score += LARGE_AUDIENCE_BONUS;
    }
    match analysis.competition_level {
        CompetitionLevel::Low => score += LOW_COMPETITION_BONUS,
        CompetitionLevel::High => score -= HIGH_COMPETITION_PENALTY,
        CompetitionLevel::Medium => {}
    }
    if analysis.sentiment > config.positive_sentiment_threshold {
        score += POSITIVE_SENTIMENT_BONUS;
    }
    if action_count > COMPLEX_PLAN_ACTIONS {
        score -= COMPLEX_PLAN_PENALTY;
    }

    score.clamp(0.0, 1.0)
}

/// Plan priority from 1 (most urgent) to 5
pub fn plan_priority(config: &PlannerConfig, analysis: &TrendAnalysis) -> u8 {
    let mut priority: i32 = 3;
    if is_high_engagement(config, analysis) {
        priority -= 1;
    }
    if is_large_audience(config, analysis) {
        priority -= 1;
    }
    if analysis.is_high_competition() {
        priority += 1;
    }
    priority.clamp(1, 5) as u8
}

pub fn identify_risks(
    config: &PlannerConfig,
    analysis: &TrendAnalysis,
    action_count: usize,
) -> Vec<Risk> {
    let mut risks = Vec::new();

    if analysis.is_high_competition() {
        risks.push(Risk {
            kind: RiskKind::HighCompetition,
            level: RiskLevel::High,
            description: "High competition may limit organic reach".to_string(),
        });
    }
    if action_count > RISKY_PLAN_ACTIONS {
        risks.push(Risk {
            kind: RiskKind::ComplexPlan,
            level: RiskLevel::Medium,
            description: format!(
                "Plan has {action_count} actions; coordination overhead is likely"
            ),
        });
    }
    if analysis.audience_size < config.small_audience_threshold {
        risks.push(Risk {
            kind: RiskKind::SmallAudience,
            level: RiskLevel::Medium,
            description: format!(
                "Audience of {} is below {}",
                analysis.audience_size, config.small_audience_threshold
            ),
        });
    }
    if analysis.sentiment < config.negative_sentiment_threshold {
        risks.push(Risk {
            kind: RiskKind::NegativeSentiment,
            level: RiskLevel::High,
            description: "Strongly negative sentiment around the topic".to_string(),
        });
    }

    risks
}

/// Capability union, total duration and estimated cost of a set of actions
pub fn resource_requirements(config: &PlannerConfig, actions: &[Action]) -> ResourceRequirements {
    let capabilities: BTreeSet<&str> = actions
        .iter()
        .flat_map(|action| action.required_capabilities.iter().map(String::as_str))
        .collect();

    let capability_cost: f64 = capabilities
        .iter()
        .map(|capability| config.capability_costs.get(*capability).copied().unwrap_or(0.0))
        .sum();

    ResourceRequirements {
        capabilities: capabilities.into_iter().map(str::to_string).collect(),
        total_duration_ms: actions.iter().map(|a| a.estimated_duration_ms).sum(),
        estimated_cost: config.per_action_cost * actions.len() as f64 + capability_cost,
    }
}
