//! Connection state of a device actor.
//!
//! ```text
//!            Dial              DialSucceeded
//!   Idle ──────────> Connecting ─────────────> Connected
//!    ^                  │                        │
//!    └──── DialFailed ──┘        ConnectionLost  │
//!                                                v
//!   Disconnected <── (no auto reconnect) ────────┤
//!        │ Dial                                  │ (auto reconnect)
//!        v                                       v
//!    Connecting                        Reconnecting{attempt}
//!                                        │ DialFailed: attempt + 1
//!                                        └─ DialSucceeded ──> Connected
//! ```
//!
//! `Close` moves every state to `Closed`, which is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ActorState {
    /// Never connected, or the last lazy dial failed.
    Idle,

    /// Dialing on behalf of a caller.
    Connecting,

    Connected,

    /// Link lost with auto reconnect off; the next operation dials again.
    Disconnected,

    /// Link lost with auto reconnect on; `attempt` counts dials since the loss.
    Reconnecting { attempt: u32 },

    Closed,
}

/// Inputs of the actor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorEvent {
    Dial,
    DialSucceeded,
    DialFailed,
    ConnectionLost { auto_reconnect: bool },
    Close,
}

impl ActorState {
    /// Apply `event`, returning the next state.
    ///
    /// Events that do not apply to the current state leave it unchanged.
    #[must_use]
    pub fn next(self, event: ActorEvent) -> Self {
        use ActorEvent as E;
        use ActorState as S;

        match (self, event) {
            (S::Closed, _) | (_, E::Close) => S::Closed,

            (S::Idle | S::Disconnected, E::Dial) => S::Connecting,
            (S::Connecting, E::DialSucceeded) => S::Connected,
            (S::Connecting, E::DialFailed) => S::Idle,

            (S::Connected, E::ConnectionLost { auto_reconnect: false }) => S::Disconnected,
            (S::Connected, E::ConnectionLost { auto_reconnect: true }) => {
                S::Reconnecting { attempt: 0 }
            }

            (S::Reconnecting { attempt }, E::Dial) => S::Reconnecting {
                attempt: attempt.saturating_add(1),
            },
            (S::Reconnecting { .. }, E::DialSucceeded) => S::Connected,

            (state, _) => state,
        }
    }

    /// Returns `true` when `event` changes the state.
    #[must_use]
    pub fn accepts(self, event: ActorEvent) -> bool {
        self.next(event) != self
    }

    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Reconnecting { attempt } => write!(f, "Reconnecting({attempt})"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ActorState::Idle, ActorEvent::Dial, ActorState::Connecting)]
    #[case(ActorState::Connecting, ActorEvent::DialSucceeded, ActorState::Connected)]
    #[case(ActorState::Connecting, ActorEvent::DialFailed, ActorState::Idle)]
    #[case(
        ActorState::Connected,
        ActorEvent::ConnectionLost { auto_reconnect: false },
        ActorState::Disconnected
    )]
    #[case(
        ActorState::Connected,
        ActorEvent::ConnectionLost { auto_reconnect: true },
        ActorState::Reconnecting { attempt: 0 }
    )]
    #[case(ActorState::Disconnected, ActorEvent::Dial, ActorState::Connecting)]
    #[case(
        ActorState::Reconnecting { attempt: 2 },
        ActorEvent::Dial,
        ActorState::Reconnecting { attempt: 3 }
    )]
    #[case(
        ActorState::Reconnecting { attempt: 3 },
        ActorEvent::DialSucceeded,
        ActorState::Connected
    )]
    #[case(ActorState::Connected, ActorEvent::Close, ActorState::Closed)]
    #[case(ActorState::Connecting, ActorEvent::Close, ActorState::Closed)]
    fn test_transitions(
        #[case] from: ActorState,
        #[case] event: ActorEvent,
        #[case] to: ActorState,
    ) {
        assert_eq!(from.next(event), to);
        assert!(from.accepts(event));
    }

    #[test]
    fn test_closed_is_terminal() {
        for event in [
            ActorEvent::Dial,
            ActorEvent::DialSucceeded,
            ActorEvent::DialFailed,
            ActorEvent::ConnectionLost {
                auto_reconnect: true,
            },
        ] {
            assert_eq!(ActorState::Closed.next(event), ActorState::Closed);
        }
    }

    #[test]
    fn test_ignored_events() {
        assert!(!ActorState::Idle.accepts(ActorEvent::DialSucceeded));
        assert!(!ActorState::Connected.accepts(ActorEvent::Dial));
        assert!(!ActorState::Reconnecting { attempt: 1 }.accepts(ActorEvent::DialFailed));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ActorState::Reconnecting { attempt: 2 }).unwrap();
        assert_eq!(json, r#"{"state":"reconnecting","attempt":2}"#);
    }
}
