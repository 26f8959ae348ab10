//! Bridge lifecycle state machine
//!
//! ```text
//! Stopped ─► Starting ─► Listening ─► Idle ⇄ Connected
//!    ▲          │                       │        │
//!    │          └─(bind failed)         ▼        ▼
//!    └────────────────────────────── Stopping ◄──┘
//! ```

use serde::Serialize;

/// Bridge lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Not listening
    Stopped,
    /// Binding the listen socket
    Starting,
    /// Socket bound, accept loop not yet running
    Listening,
    /// Accepting connections, no client attached
    Idle,
    /// One client attached and being served
    Connected,
    /// Shutting down
    Stopping,
}

impl BridgeState {
    /// Whether the listen socket is bound
    pub fn is_running(self) -> bool {
        matches!(
            self,
            BridgeState::Listening | BridgeState::Idle | BridgeState::Connected
        )
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_transition(self, next: BridgeState) -> bool {
        use BridgeState::*;

        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Listening)
                | (Starting, Stopped)
                | (Listening, Idle)
                | (Idle, Connected)
                | (Connected, Idle)
                | (Listening, Stopping)
                | (Idle, Stopping)
                | (Connected, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BridgeState::Stopped => "stopped",
            BridgeState::Starting => "starting",
            BridgeState::Listening => "listening",
            BridgeState::Idle => "idle",
            BridgeState::Connected => "connected",
            BridgeState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BridgeState::*;

    #[test]
    fn test_bridge_lifecycle() {
        let path = [Stopped, Starting, Listening, Idle, Connected, Idle, Stopping, Stopped];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_bind_failure_returns_to_stopped() {
        assert!(Starting.can_transition(Stopped));
        assert!(!Starting.is_running());
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Stopped.can_transition(Connected));
        assert!(!Connected.can_transition(Connected));
        assert!(!Stopping.can_transition(Idle));
        assert!(!Stopping.can_transition(Connected));
        assert!(!Idle.can_transition(Stopped));
    }

    #[test]
    fn test_is_running() {
        assert!(Listening.is_running());
        assert!(Idle.is_running());
        assert!(Connected.is_running());
        assert!(!Stopped.is_running());
        assert!(!Stopping.is_running());
    }

    #[test]
    fn test_serialize() {
        assert_eq!(serde_json::to_string(&Connected).unwrap(), r#""connected""#);
    }
}
