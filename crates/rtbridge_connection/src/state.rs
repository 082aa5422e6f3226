//! Connection states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity as inferred from the liveness signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No connection, and none is being attempted.
    #[default]
    Disconnected,
    /// Waiting for the first connection of this subscription.
    Connecting,
    /// A connection existed and dropped; waiting for it to return.
    Reconnecting,
    /// The backend reports a live connection.
    Connected,
}

impl ConnectionState {
    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }

    /// Returns true while connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Returns true while a connection is being awaited.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
