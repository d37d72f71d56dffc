use super::{
    errors::{StateMachineError, StateMachineResult},
    events::PipelineEvent,
    states::PipelineStatus,
};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PipelineStateMachine {
    state: PipelineStatus,
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> PipelineStatus {
        self.state
    }

    pub fn transition(&mut self, event: &PipelineEvent) -> StateMachineResult<PipelineStatus> {
        let target = Self::determine_target_state(self.state, event)?;
        debug!(
            from = %self.state,
            to = %target,
            event = event.event_type(),
            "Pipeline state transition"
        );
        self.state = target;
        Ok(target)
    }

    /// `Finish` resolves to success only when every stage completed; a run that
    /// completed nothing without aborting still counts as failed
    pub fn determine_target_state(
        current_state: PipelineStatus,
        event: &PipelineEvent,
    ) -> StateMachineResult<PipelineStatus> {
        let target = match (current_state, event) {
            (PipelineStatus::Pending, PipelineEvent::Start) => PipelineStatus::Running,
            (PipelineStatus::Running, PipelineEvent::Finish { completed, total }) => {
                if completed == total {
                    PipelineStatus::Success
                } else if *completed > 0 {
                    PipelineStatus::PartialSuccess
                } else {
                    PipelineStatus::Failed
                }
            }
            (PipelineStatus::Running, PipelineEvent::Abort(_)) => PipelineStatus::Failed,
            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: Some(from_state.to_string()),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
