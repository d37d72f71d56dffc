// Status machines for sagas and pipeline executions
//
// Transitions are validated in one place so the executors cannot move a saga or a
// pipeline backwards through its lifecycle.

pub mod errors;
pub mod events;
pub mod pipeline_state_machine;
pub mod saga_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{PipelineEvent, SagaEvent};
pub use pipeline_state_machine::PipelineStateMachine;
pub use saga_state_machine::SagaStateMachine;
pub use states::{PipelineStatus, SagaStatus, StageStatus, StepStatus};
