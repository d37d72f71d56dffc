//! # Action Ordering
//!
//! Kahn's algorithm over the action dependency graph. Among the actions whose
//! dependencies are all placed, the one with the lowest
//! `(priority, estimated duration, id)` goes next, so the result is deterministic
//! for a given action set and never places an action before its dependencies.

use crate::error::{CoreError, Result};
use crate::models::{Action, ActionId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

type ReadyKey = Reverse<(u8, u64, ActionId)>;

fn ready_key(action: &Action) -> ReadyKey {
    Reverse((action.priority, action.estimated_duration_ms, action.id))
}

/// Order `actions` so that every dependency precedes its dependents
///
/// # Errors
///
/// - [`CoreError::UnknownDependency`] when an action names an id that is not in the set
/// - [`CoreError::CyclicDependency`] when the graph contains a cycle
pub fn order_actions(actions: Vec<Action>) -> Result<Vec<Action>> {
    let index: HashMap<ActionId, usize> = actions
        .iter()
        .enumerate()
        .map(|(position, action)| (action.id, position))
        .collect();

    let mut in_degree = vec![0usize; actions.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];

    for (position, action) in actions.iter().enumerate() {
        for dependency in &action.dependencies {
            let Some(&dep_position) = index.get(dependency) else {
                return Err(CoreError::UnknownDependency {
                    action: action.id.to_string(),
                    dependency: dependency.to_string(),
                });
            };
            in_degree[position] += 1;
            dependents[dep_position].push(position);
        }
    }

    let mut ready: BinaryHeap<(ReadyKey, usize)> = actions
        .iter()
        .enumerate()
        .filter(|(position, _)| in_degree[*position] == 0)
        .map(|(position, action)| (ready_key(action), position))
        .collect();

    let mut order = Vec::with_capacity(actions.len());
    while let Some((_, position)) = ready.pop() {
        order.push(position);
        for &dependent in &dependents[position] {
            in_degree[dependent] = in_degree[dependent].saturating_sub(1);
            if in_degree[dependent] == 0 {
                ready.push((ready_key(&actions[dependent]), dependent));
            }
        }
    }

    if order.len() != actions.len() {
        let mut stuck: Vec<String> = actions
            .iter()
            .enumerate()
            .filter(|(position, _)| in_degree[*position] > 0)
            .map(|(_, action)| format!("{}({})", action.action_type, action.id))
            .collect();
        stuck.sort();
        return Err(CoreError::CyclicDependency { actions: stuck });
    }

    let mut slots: Vec<Option<Action>> = actions.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect())
}
