//! # Orchestration
//!
//! Execution side of the core.
//!
//! ## Components
//!
//! - **CapabilityRegistry**: providers that do the actual work, keyed by action
//!   type or stage name
//! - **SagaExecutor**: runs a plan as a compensating saga
//! - **PipelineRunner**: runs a declarative stage list with per-stage retry,
//!   timeouts and partial success
//! - **OrchestrationCore**: wires every component from one configuration
//!
//! Executors write progress notes to the session context store and publish
//! lifecycle events on the event bus. Neither side effect can change an outcome.

pub mod capability;
pub mod core;
pub mod pipeline_definition;
pub mod pipeline_runner;
pub(crate) mod progress;
pub mod saga_executor;

pub use capability::{CapabilityProvider, CapabilityRegistry, CapabilityRequest, FnCapability};
pub use self::core::OrchestrationCore;
pub use pipeline_definition::{InputMapper, OutputMapper, PipelineDefinition, StageDefinition};
pub use pipeline_runner::PipelineRunner;
pub use saga_executor::{SagaExecutor, SagaStep};
