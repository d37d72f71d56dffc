//! # Task Planner
//!
//! Validates trend analyses and produces dependency-ordered plans.

pub mod analysis;
pub mod dependency;
pub mod scoring;
pub mod task_planner;

pub use analysis::{CompetitionLevel, TrendAnalysis};
pub use dependency::order_actions;
pub use task_planner::TaskPlanner;
