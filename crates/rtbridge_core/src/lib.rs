//! # rtbridge Core
//!
//! Shared types for the rtbridge query engine and connection monitor.
//!
//! This crate provides:
//! - `ValidationError` / `BackendError` and the `BridgeError` umbrella
//! - `DbPath` path validation
//! - `QueryConstraints` parsed from untrusted constraint sets
//! - `Priority` coercion (`check_priority`)
//! - Listener kinds, write methods and on-disconnect methods
//! - The two SDK shapes (`AdminDatabase`, `ClientDatabase`) and the
//!   unified `RealtimeBackend` capability interface
//! - The `Session` collaborator surface (admin flag, handle, lifecycle)
//!
//! ## Key Invariants
//!
//! - Every caller-supplied descriptor is validated before a backend call
//! - Validation failures and backend failures are distinct error kinds
//! - The admin/client backend is selected once per session

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod constraints;
mod error;
mod listener;
mod method;
mod path;
mod priority;
mod sdk;
mod session;
mod snapshot;

pub use backend::{AdminBackend, ClientBackend, RealtimeBackend};
pub use constraints::{Bound, Limit, OrderBy, QueryConstraints, Scalar};
pub use error::{
    BackendError, BackendErrorCode, BackendResult, BridgeError, BridgeResult, ValidationError,
    ValidationResult,
};
pub use listener::{
    same_callback, CancelCallback, ClientUnsubscribe, ListenerCallback, ListenerKind, Unsubscribe,
};
pub use method::{OnDisconnectMethod, OnDisconnectOp, WriteMethod, WriteOp};
pub use path::DbPath;
pub use priority::{check_priority, Priority};
pub use sdk::{AdminDatabase, ClientDatabase, DatabaseHandle, DatabaseWrites, OnDisconnect};
pub use session::{LifecycleObserver, Session, SessionEvent};
pub use snapshot::Snapshot;
