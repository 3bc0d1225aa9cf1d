//! Run step state machine.
//!
//! Validates state transitions for run steps, enforcing the allowed
//! transition graph. The transactional transition logic (run locking,
//! ready-gate promotion, cancel cascades) lives in [`service`].

pub mod service;

use thiserror::Error;
use uuid::Uuid;

use slipway_db::models::RunStepStatus;

/// The run step state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// pending     -> ready        (all input steps completed)
/// ready       -> in_progress  (production started)
/// in_progress -> completed    (production finished)
/// pending     -> cancelled
/// ready       -> cancelled
/// in_progress -> cancelled
/// ```
///
/// `completed` and `cancelled` are terminal.
pub struct RunStateMachine;

impl RunStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge in
    /// the state graph.
    pub fn is_valid_transition(from: RunStepStatus, to: RunStepStatus) -> bool {
        matches!(
            (from, to),
            (RunStepStatus::Pending, RunStepStatus::Ready)
                | (RunStepStatus::Ready, RunStepStatus::InProgress)
                | (RunStepStatus::InProgress, RunStepStatus::Completed)
                | (RunStepStatus::Pending, RunStepStatus::Cancelled)
                | (RunStepStatus::Ready, RunStepStatus::Cancelled)
                | (RunStepStatus::InProgress, RunStepStatus::Cancelled)
        )
    }
}

/// Run lifecycle failures.
///
/// An [`InvalidTransition`](TransitionError::InvalidTransition) rejects a
/// single requested change; the rest of the run is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid step transition: {from} -> {to}")]
    InvalidTransition {
        from: RunStepStatus,
        to: RunStepStatus,
    },
    #[error("run {0} not found")]
    RunNotFound(Uuid),
    #[error("run step {0} not found")]
    StepNotFound(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunStepStatus::*;

    #[test]
    fn valid_transitions_accepted() {
        let valid = [
            (Pending, Ready),
            (Ready, InProgress),
            (InProgress, Completed),
            (Pending, Cancelled),
            (Ready, Cancelled),
            (InProgress, Cancelled),
        ];
        for (from, to) in valid {
            assert!(
                RunStateMachine::is_valid_transition(from, to),
                "{from} -> {to} should be valid"
            );
        }
    }

    #[test]
    fn invalid_transitions_rejected() {
        let invalid = [
            // Skipping states.
            (Pending, InProgress),
            (Pending, Completed),
            (Ready, Completed),
            // Backwards.
            (Ready, Pending),
            (InProgress, Ready),
            (Completed, InProgress),
            // Out of terminal states.
            (Completed, Cancelled),
            (Cancelled, Ready),
            (Cancelled, Pending),
            // Self loops.
            (Pending, Pending),
            (InProgress, InProgress),
        ];
        for (from, to) in invalid {
            assert!(
                !RunStateMachine::is_valid_transition(from, to),
                "{from} -> {to} should be invalid"
            );
        }
    }

    #[test]
    fn every_non_terminal_state_can_cancel() {
        for from in [Pending, Ready, InProgress] {
            assert!(RunStateMachine::is_valid_transition(from, Cancelled));
        }
    }
}
