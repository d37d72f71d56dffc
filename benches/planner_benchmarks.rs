use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use viralize_core::config::PlannerConfig;
use viralize_core::models::{Action, ActionType};
use viralize_core::planner::{order_actions, TaskPlanner};

fn benchmark_generate_plan(c: &mut Criterion) {
    let planner = TaskPlanner::new(PlannerConfig::default());
    let analysis = json!({
        "engagementRate": 0.08,
        "audienceSize": 20000,
        "contentTypes": ["video", "text"],
        "competitionLevel": "low",
        "sentiment": 0.4,
        "peakHours": [9, 18, 21]
    });

    c.bench_function("generate_plan", |b| {
        b.iter(|| planner.generate_plan("tenant", "session", black_box(&analysis)))
    });
}

/// Layered graph: every action depends on the whole previous layer
fn layered_actions(layers: usize, width: usize) -> Vec<Action> {
    let mut actions: Vec<Action> = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        let previous: Vec<_> = actions
            .iter()
            .skip(layer.saturating_sub(1) * width)
            .map(|a| a.id)
            .collect();
        for _ in 0..width {
            let mut action = Action::new(ActionType::ContentGeneration, json!({}));
            if layer > 0 {
                action.dependencies = previous.clone();
            }
            actions.push(action);
        }
    }
    actions.reverse();
    actions
}

fn benchmark_order_actions(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_actions");
    for (layers, width) in [(5, 1), (10, 4), (20, 8)] {
        let actions = layered_actions(layers, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{layers}x{width}")),
            &actions,
            |b, actions| b.iter(|| order_actions(black_box(actions.clone()))),
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark_generate_plan, benchmark_order_actions);
criterion_main!(benches);
