//! Observable session state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session; initial state and the state every session returns to
    #[default]
    Idle,
    /// `connect()` in progress
    Connecting,
    /// Answer applied, media flowing
    Connected,
    /// The last `connect()` failed; resources are being released
    Failed,
    /// Resources are being released after a disconnect
    Closed,
}

impl ConnectionState {
    /// Whether a session currently owns (or is acquiring) resources
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a presentation layer renders
///
/// `is_listening` is only ever true together with
/// [`ConnectionState::Connected`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current connection state
    pub connection_state: ConnectionState,
    /// Remote media attached and handshake complete
    pub is_listening: bool,
    /// Message of the most recent `connect()` failure
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Whether the session is connected
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        self.is_listening = state == ConnectionState::Connected;
    }
}

/// Resources currently held by the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSummary {
    /// A peer link exists
    pub peer_link: bool,
    /// Local tracks not yet stopped
    pub local_tracks: usize,
}

impl ResourceSummary {
    /// Nothing is held
    pub fn is_empty(&self) -> bool {
        !self.peer_link && self.local_tracks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Idle.is_active());
        assert!(!ConnectionState::Failed.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }

    #[test]
    fn test_listening_follows_connected() {
        let mut snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.connection_state, ConnectionState::Idle);
        assert!(!snapshot.is_listening);

        snapshot.set_state(ConnectionState::Connected);
        assert!(snapshot.is_listening);
        assert!(snapshot.is_connected());

        snapshot.set_state(ConnectionState::Closed);
        assert!(!snapshot.is_listening);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = SessionSnapshot {
            connection_state: ConnectionState::Failed,
            is_listening: false,
            last_error: Some("Signaling failed: server returned HTTP 500".to_string()),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["connection_state"], "failed");
        assert_eq!(json["is_listening"], false);
    }
}
