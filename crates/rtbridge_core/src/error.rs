//! Error types for rtbridge.
//!
//! Two disjoint kinds exist. `ValidationError` is raised locally, before any
//! backend call is attempted. `BackendError` is whatever the underlying
//! database reported. Neither is retried by the core.

use std::fmt;
use thiserror::Error;

/// Result type for validation steps.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for calls into a backing database.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for query engine entry points.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A caller-supplied descriptor was rejected before reaching the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Path contains a forbidden character.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path as supplied.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A non-empty path was required.
    #[error("path must not be empty")]
    EmptyPath,

    /// The constraint set was not an object.
    #[error("query constraints must be an object, got {0}")]
    ConstraintsNotObject(String),

    /// Constraint name is not one of the supported constraints.
    #[error("unknown query constraint: {0}")]
    UnknownConstraint(String),

    /// Constraint value has the wrong shape.
    #[error("invalid value for query constraint {name}: {reason}")]
    InvalidConstraint {
        /// Constraint name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two constraints that cannot be combined in one query.
    #[error("query constraints {first} and {second} cannot be combined")]
    ConflictingConstraints {
        /// First constraint name.
        first: String,
        /// Second constraint name.
        second: String,
    },

    /// Listener kind is not one of the supported kinds.
    #[error("unknown listener: {0}")]
    UnknownListener(String),

    /// Method name is not part of the given method family.
    #[error("unknown {family} method: {name}")]
    UnknownMethod {
        /// Method family (`write` or `onDisconnect`).
        family: &'static str,
        /// The supplied name.
        name: String,
    },

    /// Positional arguments do not match the method shape.
    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments {
        /// Method name.
        method: String,
        /// Why the arguments were rejected.
        reason: String,
    },

    /// Priority is neither null nor a positive integer.
    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    /// Session discriminant disagrees with the database handle.
    #[error("session is {expected} but the database handle is {actual}")]
    BackendMismatch {
        /// Kind declared by the session flag.
        expected: &'static str,
        /// Kind of the supplied handle.
        actual: &'static str,
    },
}

impl ValidationError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_constraint(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConstraint {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_arguments(method: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Category of a backend-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorCode {
    /// Network or transport failure.
    Network,
    /// Security rules rejected the operation.
    PermissionDenied,
    /// The client is offline.
    Disconnected,
    /// A listener was cancelled by the backend.
    ListenerCancelled,
    /// Anything else.
    Other,
}

impl BackendErrorCode {
    /// Returns the wire-style name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network-error",
            Self::PermissionDenied => "permission-denied",
            Self::Disconnected => "disconnected",
            Self::ListenerCancelled => "listener-cancelled",
            Self::Other => "unknown",
        }
    }
}

impl fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the backing database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Failure category.
    pub code: BackendErrorCode,
    /// Message as provided by the backend.
    pub message: String,
}

impl BackendError {
    /// Creates a backend error.
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a permission-denied error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::PermissionDenied, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Network, message)
    }
}

/// Error returned by query engine entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Rejected locally before any backend call.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Reported by the backing database.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl BridgeError {
    /// Returns true if the error was raised by local validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, BridgeError::Validation(_))
    }

    /// Returns true if the error came from the backend.
    pub fn is_backend(&self) -> bool {
        matches!(self, BridgeError::Backend(_))
    }
}
