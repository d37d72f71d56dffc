mod common;

use common::strategies::*;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use viralize_core::config::PlannerConfig;
use viralize_core::error::CoreError;
use viralize_core::models::{Action, ActionType, RiskKind};
use viralize_core::planner::{order_actions, TaskPlanner};

fn is_ordered(actions: &[Action]) -> bool {
    let mut placed = HashSet::new();
    actions.iter().all(|action| {
        let ready = action.dependencies.iter().all(|dep| placed.contains(dep));
        placed.insert(action.id);
        ready
    })
}

proptest! {
    /// Property: every accepted analysis yields a dependency-ordered plan
    #[test]
    fn plans_are_dependency_ordered(analysis in valid_analysis_strategy()) {
        let planner = TaskPlanner::new(PlannerConfig::default());
        let result = planner.generate_plan("tenant", "session", &analysis).unwrap();

        prop_assert!(result.plan.is_dependency_ordered());
        prop_assert!((0.0..=1.0).contains(&result.confidence_score));
        prop_assert!((1..=5).contains(&result.plan.priority));
        prop_assert!(result.plan.estimated_completion >= result.plan.created_at);
    }

    /// Property: timing always precedes scheduling, both always present
    #[test]
    fn scheduling_follows_timing(analysis in valid_analysis_strategy()) {
        let planner = TaskPlanner::new(PlannerConfig::default());
        let actions = planner.generate_plan("tenant", "session", &analysis).unwrap().plan.actions;

        let position = |kind: ActionType| actions.iter().position(|a| a.action_type == kind);
        let timing = position(ActionType::TimingOptimization);
        let scheduling = position(ActionType::Scheduling);
        prop_assert!(timing.is_some() && scheduling.is_some());
        prop_assert!(timing < scheduling);
    }

    /// Property: high competition never produces generic content generation
    #[test]
    fn high_competition_skips_generation(analysis in valid_analysis_strategy()) {
        let planner = TaskPlanner::new(PlannerConfig::default());
        let result = planner.generate_plan("tenant", "session", &analysis).unwrap();
        let has_generation = result
            .plan
            .actions
            .iter()
            .any(|a| a.action_type == ActionType::ContentGeneration);

        prop_assert_eq!(has_generation, analysis["competitionLevel"] != json!("high"));
    }

    /// Property: resource totals agree with the plan
    #[test]
    fn resource_requirements_match_actions(analysis in valid_analysis_strategy()) {
        let planner = TaskPlanner::new(PlannerConfig::default());
        let result = planner.generate_plan("tenant", "session", &analysis).unwrap();
        let resources = &result.resource_requirements;

        prop_assert_eq!(
            resources.total_duration_ms,
            result.plan.total_duration().as_millis() as u64
        );
        let mut sorted = resources.capabilities.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&sorted, &resources.capabilities);
    }

    /// Property: ordering any acyclic action set keeps every action and respects edges
    #[test]
    fn ordering_is_a_topological_permutation(actions in action_dag_strategy()) {
        let ids: HashSet<_> = actions.iter().map(|a| a.id).collect();
        let ordered = order_actions(actions.clone()).unwrap();

        prop_assert_eq!(ordered.len(), actions.len());
        prop_assert_eq!(ordered.iter().map(|a| a.id).collect::<HashSet<_>>(), ids);
        prop_assert!(is_ordered(&ordered));
    }

    /// Property: the result does not depend on input order
    #[test]
    fn ordering_is_input_order_independent(actions in action_dag_strategy()) {
        let mut reversed = actions.clone();
        reversed.reverse();

        let first: Vec<_> = order_actions(actions).unwrap().iter().map(|a| a.id).collect();
        let second: Vec<_> = order_actions(reversed).unwrap().iter().map(|a| a.id).collect();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn cycle_is_rejected() {
    let mut first = Action::new(ActionType::AudienceAnalysis, json!({}));
    let second = Action::new(ActionType::TimingOptimization, json!({})).depends_on(first.id);
    let third = Action::new(ActionType::Scheduling, json!({})).depends_on(second.id);
    first.dependencies.push(third.id);

    let result = order_actions(vec![first, second, third]);
    assert!(matches!(result, Err(CoreError::CyclicDependency { .. })));
}

#[test]
fn dangling_dependency_is_rejected() {
    let orphan = Action::new(ActionType::Scheduling, json!({})).depends_on(uuid::Uuid::new_v4());
    let result = order_actions(vec![orphan]);
    assert!(matches!(result, Err(CoreError::UnknownDependency { .. })));
}

#[test]
fn reference_analysis_produces_the_five_action_plan() {
    let planner = TaskPlanner::new(PlannerConfig::default());
    let result = planner
        .generate_plan("tenant", "session", &common::reference_analysis())
        .unwrap();

    assert_eq!(
        result.plan.actions.iter().map(|a| a.action_type).collect::<Vec<_>>(),
        vec![
            ActionType::AudienceAnalysis,
            ActionType::TimingOptimization,
            ActionType::ContentGeneration,
            ActionType::ContentCreation,
            ActionType::Scheduling,
        ]
    );
    assert!(result.confidence_score > 0.7);
    assert_eq!(
        result.risks.iter().map(|r| r.kind).collect::<Vec<_>>(),
        vec![RiskKind::ComplexPlan]
    );
}
