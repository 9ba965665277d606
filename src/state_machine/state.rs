use std::fmt;

use serde::{Deserialize, Serialize};

use super::item::ItemStatus;

/// The phases a single work item passes through while it is being called.
///
/// Each item flows through:
/// PENDING → DIALING → WAIT_POST_DIAL → WAIT_PRE_AUDIO → PLAYING → WAIT_CALL
/// → (HANGING_UP) → DONE, with FAILED reachable from any working phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Pending,
    Dialing,
    WaitingPostDial,
    WaitingPreAudio,
    PlayingAudio,
    WaitingCallTimeout,
    HangingUp,
    Done,
    Failed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Pending => write!(f, "PENDING"),
            CallState::Dialing => write!(f, "DIALING"),
            CallState::WaitingPostDial => write!(f, "WAIT_POST_DIAL"),
            CallState::WaitingPreAudio => write!(f, "WAIT_PRE_AUDIO"),
            CallState::PlayingAudio => write!(f, "PLAYING"),
            CallState::WaitingCallTimeout => write!(f, "WAIT_CALL"),
            CallState::HangingUp => write!(f, "HANGING_UP"),
            CallState::Done => write!(f, "DONE"),
            CallState::Failed => write!(f, "FAILED"),
        }
    }
}

/// The result of performing the work attached to a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failure(String),
}

/// The result of evaluating a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Advance to the next state.
    Next(CallState),
    /// The item has settled. `Failed` carries the message of the step that broke.
    Complete {
        status: ItemStatus,
        error: Option<String>,
    },
}

/// Computes the next phase of a call. No retries: any failing step settles
/// the item as `Failed`.
pub struct StateMachine;

impl StateMachine {
    /// Compute the transition out of `state` given the outcome of its step.
    ///
    /// - A failure in any state settles the item as `Failed`.
    /// - `WaitingCallTimeout` goes to `HangingUp` only when `auto_hangup` is
    ///   set, otherwise straight to `Done`.
    /// - `Done` and `Failed` always return `Complete`.
    pub fn next(state: CallState, outcome: StepOutcome, auto_hangup: bool) -> Transition {
        if let StepOutcome::Failure(error) = outcome {
            return Transition::Complete {
                status: ItemStatus::Failed,
                error: Some(error),
            };
        }

        match state {
            CallState::Pending => Transition::Next(CallState::Dialing),
            CallState::Dialing => Transition::Next(CallState::WaitingPostDial),
            CallState::WaitingPostDial => Transition::Next(CallState::WaitingPreAudio),
            CallState::WaitingPreAudio => Transition::Next(CallState::PlayingAudio),
            CallState::PlayingAudio => Transition::Next(CallState::WaitingCallTimeout),
            CallState::WaitingCallTimeout if auto_hangup => Transition::Next(CallState::HangingUp),
            CallState::WaitingCallTimeout | CallState::HangingUp => {
                Transition::Next(CallState::Done)
            }
            CallState::Done => Transition::Complete {
                status: ItemStatus::Done,
                error: None,
            },
            CallState::Failed => Transition::Complete {
                status: ItemStatus::Failed,
                error: None,
            },
        }
    }
}
