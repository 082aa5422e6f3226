//! Error types for the connection monitor.

use thiserror::Error;

/// Result type for connection monitor operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors raised by the connection monitor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The monitor was created outside a tokio runtime.
    #[error("connection monitor requires a tokio runtime")]
    NoRuntime,

    /// No session has signed in since the monitor was created or detached.
    #[error("no session is attached to the connection monitor")]
    NoSession,
}
