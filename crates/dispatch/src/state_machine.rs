use anyhow::anyhow;
use outreach_core::OutreachResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Init,
    Authenticating,
    /// Between targets.
    Dispatching,
    Selecting,
    Sending,
    Throttling,
    Completed,
    Aborted,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::Completed | DispatchState::Aborted)
    }
}

/// Describes a single valid state transition for a dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DispatchState,
    pub to: DispatchState,
    pub trigger: String,
}

/// Guards the dispatch loop by enforcing a finite set of valid transitions.
#[derive(Debug, Clone)]
pub struct DispatchStateMachine {
    pub state: DispatchState,
    pub transitions: Vec<StateTransition>,
}

impl DispatchStateMachine {
    pub fn new() -> Self {
        use DispatchState::*;

        let table = [
            (Init, Authenticating, "request_validated"),
            (Authenticating, Dispatching, "session_established"),
            (Authenticating, Aborted, "authentication_failed"),
            (Dispatching, Selecting, "next_target"),
            (Dispatching, Completed, "targets_exhausted"),
            (Dispatching, Aborted, "session_check_failed"),
            (Selecting, Sending, "message_selected"),
            (Selecting, Throttling, "resolve_failed"),
            (Sending, Throttling, "send_finished"),
            (Throttling, Dispatching, "delay_elapsed"),
            (Throttling, Aborted, "session_lost_after_failure"),
        ];

        let transitions = table
            .iter()
            .map(|(from, to, trigger)| StateTransition {
                from: *from,
                to: *to,
                trigger: trigger.to_string(),
            })
            .collect();

        Self {
            state: Init,
            transitions,
        }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: &DispatchState, to: &DispatchState) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.to == *to)
    }

    /// Attempts to move the state machine to `to`. Returns an error if the
    /// transition is not permitted.
    pub fn transition(&mut self, to: DispatchState) -> OutreachResult<()> {
        if self.can_transition(&self.state, &to) {
            tracing::trace!(from = ?self.state, to = ?to, "Dispatch state transition");
            self.state = to;
            Ok(())
        } else {
            Err(anyhow!(
                "Invalid dispatch state transition from {:?} to {:?}",
                self.state,
                to
            )
            .into())
        }
    }
}

impl Default for DispatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
