#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Viralize Core
//!
//! Orchestration core for content viralization workflows.
//!
//! ## Overview
//!
//! A trend analysis goes in; the core plans the work, executes it as a
//! compensating saga or as a staged pipeline, and keeps watch over the agents
//! doing the work. Every piece of real work happens behind a
//! [`CapabilityProvider`](orchestration::CapabilityProvider), so the core itself
//! is deterministic and testable without live services.
//!
//! ## Components
//!
//! - **Event Bus** ([`events`]): typed pub/sub with per-subscription retry,
//!   exponential backoff and a dead-letter channel
//! - **Task Planner** ([`planner`]): validates an analysis and produces a
//!   dependency-ordered plan with a confidence score, risks and resource needs
//! - **Saga Executor** ([`orchestration::saga_executor`]): sequential steps with
//!   retry, timeout and reverse-order compensation
//! - **Pipeline Runner** ([`orchestration::pipeline_runner`]): declarative stages
//!   with input/output mapping, per-stage retry and partial success
//! - **Heartbeat Monitor** ([`health`]): agent health, alerts and periodic system
//!   health snapshots
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration
//! - [`error`] - Error taxonomy
//! - [`logging`] - Structured logging bootstrap
//! - [`models`] - Plans, sagas, pipeline executions and health records
//! - [`state_machine`] - Validated saga and pipeline status transitions
//! - [`resilience`] - Backoff and error classification
//! - [`store`] - Key-value and session context store seams
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use viralize_core::config::OrchestratorConfig;
//! use viralize_core::orchestration::{CapabilityRegistry, OrchestrationCore};
//! use viralize_core::store::InMemoryContextStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> viralize_core::Result<()> {
//! let core = OrchestrationCore::bootstrap(
//!     OrchestratorConfig::default(),
//!     CapabilityRegistry::new(),
//!     Arc::new(InMemoryContextStore::new()),
//! )?;
//!
//! let planning = core.generate_plan(
//!     "tenant-1",
//!     "session-1",
//!     &json!({
//!         "engagementRate": 0.08,
//!         "audienceSize": 20000,
//!         "contentTypes": ["video"],
//!         "competitionLevel": "low"
//!     }),
//! )?;
//! let saga = core
//!     .create_and_execute_saga(&planning.plan, "tenant-1", "session-1")
//!     .await?;
//! println!("saga {} ended {}", saga.id, saga.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod planner;
pub mod resilience;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, OrchestratorConfig};
pub use error::{CoreError, Result};
pub use events::{EventBus, EventDraft};
pub use health::HeartbeatMonitor;
pub use orchestration::{
    CapabilityRegistry, FnCapability, OrchestrationCore, PipelineRunner, SagaExecutor,
};
pub use planner::TaskPlanner;
