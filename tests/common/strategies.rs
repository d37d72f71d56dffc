//! Proptest strategies for planner inputs and action graphs.

use proptest::prelude::*;
use serde_json::{json, Value};
use viralize_core::models::{Action, ActionType};

const CONTENT_TYPES: [&str; 6] = ["video", "reel", "story", "image", "text", "short_video"];

fn competition_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("low"), Just("medium"), Just("high")]
}

/// Any analysis the planner must accept
pub fn valid_analysis_strategy() -> impl Strategy<Value = Value> {
    (
        0.0f64..=1.0,
        0u64..200_000,
        proptest::sample::subsequence(CONTENT_TYPES.to_vec(), 0..=CONTENT_TYPES.len()),
        competition_strategy(),
        -1.0f64..=1.0,
        proptest::collection::vec(0u8..24, 0..4),
    )
        .prop_map(|(engagement, audience, types, competition, sentiment, hours)| {
            json!({
                "engagementRate": engagement,
                "audienceSize": audience,
                "contentTypes": types,
                "competitionLevel": competition,
                "sentiment": sentiment,
                "peakHours": hours,
            })
        })
}

fn action_type_strategy() -> impl Strategy<Value = ActionType> {
    prop_oneof![
        Just(ActionType::AudienceAnalysis),
        Just(ActionType::TimingOptimization),
        Just(ActionType::ContentCreation),
        Just(ActionType::ContentGeneration),
        Just(ActionType::Scheduling),
    ]
}

/// Acyclic action set: action `i` may only depend on actions `< i`.
/// Returned in reverse so the input order is never already valid by accident.
pub fn action_dag_strategy() -> impl Strategy<Value = Vec<Action>> {
    proptest::collection::vec(
        (action_type_strategy(), 1u8..6, 0u64..10_000, any::<u16>()),
        1..12,
    )
    .prop_map(|specs| {
        let mut actions: Vec<Action> = Vec::with_capacity(specs.len());
        for (position, (kind, priority, duration, mask)) in specs.into_iter().enumerate() {
            let mut action = Action::new(kind, json!({}));
            action.priority = priority;
            action.estimated_duration_ms = duration;
            for (earlier, dependency) in actions.iter().enumerate().take(position.min(16)) {
                if mask & (1 << earlier) != 0 {
                    action.dependencies.push(dependency.id);
                }
            }
            actions.push(action);
        }
        actions.reverse();
        actions
    })
}
