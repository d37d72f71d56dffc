use super::{
    errors::{StateMachineError, StateMachineResult},
    events::SagaEvent,
    states::SagaStatus,
};
use tracing::debug;

/// In-memory saga status machine; the executor owns one per running saga
#[derive(Debug, Clone, Default)]
pub struct SagaStateMachine {
    state: SagaStatus,
}

impl SagaStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> SagaStatus {
        self.state
    }

    /// Apply `event`, returning the new status
    pub fn transition(&mut self, event: &SagaEvent) -> StateMachineResult<SagaStatus> {
        let target = Self::determine_target_state(self.state, event)?;
        debug!(
            from = %self.state,
            to = %target,
            event = event.event_type(),
            "Saga state transition"
        );
        self.state = target;
        Ok(target)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: SagaStatus,
        event: &SagaEvent,
    ) -> StateMachineResult<SagaStatus> {
        let target = match (current_state, event) {
            (SagaStatus::Pending, SagaEvent::Start) => SagaStatus::Executing,
            (SagaStatus::Pending, SagaEvent::Fail(_)) => SagaStatus::Failed,

            (SagaStatus::Executing, SagaEvent::Complete) => SagaStatus::Completed,
            (SagaStatus::Executing, SagaEvent::BeginCompensation(_)) => SagaStatus::Compensating,

            (SagaStatus::Compensating, SagaEvent::FinishCompensation) => SagaStatus::Failed,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: Some(from_state.to_string()),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
