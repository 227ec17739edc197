//! Readiness state machine types.
//!
//! ```text
//! CheckingService ─┬─► ServiceRunning ─► CheckingModel ─┬─► ModelFound ─┬─► ModelReady
//!                  ├─► ServiceStarting ─┬─► ServiceRunning              └─► LoadingModel ─┬─► ModelReady
//!                  │                    └─► Degraded                                      └─► Unavailable
//!                  └─► Degraded            CheckingModel ─┬─► ModelMissing ─► Unavailable
//!                                                         └─► Degraded
//! ```
//!
//! `ModelReady`, `Degraded` and `Unavailable` are terminal. Nothing moves
//! backwards within a session; a new session starts over at `CheckingService`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    CheckingService,
    ServiceStarting,
    ServiceRunning,
    CheckingModel,
    ModelFound,
    ModelMissing,
    LoadingModel,
    ModelReady,
    /// Service absent.
    Degraded,
    /// Model absent or failed to load; fallback mode.
    Unavailable,
}

impl ReadinessState {
    pub const INITIAL: ReadinessState = ReadinessState::CheckingService;

    /// The closed set of successors of each state.
    pub fn allowed_next(self) -> &'static [ReadinessState] {
        use ReadinessState::*;
        match self {
            CheckingService => &[ServiceStarting, ServiceRunning, Degraded],
            ServiceStarting => &[ServiceRunning, Degraded],
            ServiceRunning => &[CheckingModel],
            CheckingModel => &[ModelFound, ModelMissing, Degraded],
            ModelFound => &[LoadingModel, ModelReady],
            ModelMissing => &[Unavailable],
            LoadingModel => &[ModelReady, Unavailable],
            ModelReady | Degraded | Unavailable => &[],
        }
    }

    pub fn can_transition_to(self, next: ReadinessState) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Whether the resolver should bother calling the model in this state.
    /// States still in progress are optimistic; the call carries its own timeout.
    pub fn allows_model_calls(self) -> bool {
        !matches!(
            self,
            ReadinessState::Degraded | ReadinessState::ModelMissing | ReadinessState::Unavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        use ReadinessState::*;
        match self {
            CheckingService => "checking_service",
            ServiceStarting => "service_starting",
            ServiceRunning => "service_running",
            CheckingModel => "checking_model",
            ModelFound => "model_found",
            ModelMissing => "model_missing",
            LoadingModel => "loading_model",
            ModelReady => "model_ready",
            Degraded => "degraded",
            Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the transition log; the last one is the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: ReadinessState,
    /// Unix seconds.
    pub timestamp: i64,
}

/// The one-shot message shown at the next prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    ModelReady,
    ModelNotFound,
    FallbackMode,
}

impl Announcement {
    pub fn message(self) -> &'static str {
        match self {
            Announcement::ModelReady => "model ready",
            Announcement::ModelNotFound => "fine-tuned model not found",
            Announcement::FallbackMode => "fallback mode",
        }
    }

    pub fn from_message(message: &str) -> Option<Self> {
        [
            Announcement::ModelReady,
            Announcement::ModelNotFound,
            Announcement::FallbackMode,
        ]
        .into_iter()
        .find(|a| a.message() == message.trim())
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReadinessState::*;

    const ALL: [ReadinessState; 10] = [
        CheckingService,
        ServiceStarting,
        ServiceRunning,
        CheckingModel,
        ModelFound,
        ModelMissing,
        LoadingModel,
        ModelReady,
        Degraded,
        Unavailable,
    ];

    #[test]
    fn terminal_states_have_no_successors() {
        for state in [ModelReady, Degraded, Unavailable] {
            assert!(state.is_terminal(), "{state} should be terminal");
        }
        for state in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(!state.allowed_next().is_empty());
        }
    }

    #[test]
    fn nothing_returns_to_checking_service() {
        for state in ALL {
            assert!(!state.can_transition_to(CheckingService));
        }
    }

    #[test]
    fn transitions_only_move_forward() {
        // Index in ALL is a topological order of the graph.
        let rank = |s: ReadinessState| ALL.iter().position(|x| *x == s).unwrap();
        for state in ALL {
            for next in state.allowed_next() {
                assert!(rank(*next) > rank(state), "{state} -> {next} goes backwards");
            }
        }
    }

    #[test]
    fn model_gate_closed_only_when_model_cannot_serve() {
        assert!(!Degraded.allows_model_calls());
        assert!(!ModelMissing.allows_model_calls());
        assert!(!Unavailable.allows_model_calls());
        assert!(ModelReady.allows_model_calls());
        assert!(LoadingModel.allows_model_calls());
    }

    #[test]
    fn state_serializes_as_snake_case() {
        let json = serde_json::to_string(&ServiceStarting).unwrap();
        assert_eq!(json, "\"service_starting\"");
        for state in ALL {
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{}\"", state.as_str())
            );
        }
    }

    #[test]
    fn announcement_messages_round_trip() {
        assert_eq!(
            Announcement::from_message("fallback mode\n"),
            Some(Announcement::FallbackMode)
        );
        assert_eq!(Announcement::from_message("something else"), None);
    }
}
