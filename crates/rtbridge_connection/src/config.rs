//! Configuration for the connection monitor.

use rtbridge_core::DbPath;
use std::time::Duration;

/// How long the liveness signal may stay `false` before the connection is
/// considered lost. Mirrors the server-side liveness grace period.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`ConnectionMonitor`](crate::ConnectionMonitor).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Time without a `true` signal before `disconnected` is emitted.
    pub disconnect_timeout: Duration,
    /// When set, the monitor writes `true` here on every connection and
    /// schedules `false` for when the connection drops.
    pub presence_path: Option<DbPath>,
}

impl ConnectionConfig {
    /// Creates a configuration with the default timeout and no presence marker.
    pub fn new() -> Self {
        Self {
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            presence_path: None,
        }
    }

    /// Sets the disconnect timeout.
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Sets the presence marker location.
    pub fn with_presence_path(mut self, path: DbPath) -> Self {
        self.presence_path = Some(path);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}
