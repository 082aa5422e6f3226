//! Listener kinds and unsubscription handles.

use crate::error::{BackendError, ValidationError};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The change-notification channel a subscription attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    /// Full value of the location.
    Value,
    /// A child was added.
    ChildAdded,
    /// A child's value changed.
    ChildChanged,
    /// A child moved within the ordering.
    ChildMoved,
    /// A child was removed.
    ChildRemoved,
}

impl ListenerKind {
    /// All listener kinds.
    pub const ALL: [ListenerKind; 5] = [
        ListenerKind::Value,
        ListenerKind::ChildAdded,
        ListenerKind::ChildChanged,
        ListenerKind::ChildMoved,
        ListenerKind::ChildRemoved,
    ];

    /// Returns the event name used by both SDKs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerKind::Value => "value",
            ListenerKind::ChildAdded => "child_added",
            ListenerKind::ChildChanged => "child_changed",
            ListenerKind::ChildMoved => "child_moved",
            ListenerKind::ChildRemoved => "child_removed",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListenerKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownListener(s.to_string()))
    }
}

/// Receives a snapshot and, for child events, the key of the previous sibling.
pub type ListenerCallback = Arc<dyn Fn(&Snapshot, Option<&str>) + Send + Sync>;

/// Receives the error that cancelled a listener.
pub type CancelCallback = Arc<dyn Fn(&BackendError) + Send + Sync>;

/// Detaches a client-SDK listener when called.
pub type ClientUnsubscribe = Box<dyn FnOnce() + Send>;

/// Opaque handle returned by a subscription.
///
/// The two SDKs detach listeners differently: the client SDK hands back a
/// function, the admin SDK needs the original listener kind and callback.
/// Callers route the handle back unchanged.
pub enum Unsubscribe {
    /// Function returned by the client SDK.
    Client(ClientUnsubscribe),
    /// Listener kind and callback registered with the admin SDK.
    Admin {
        /// Kind the callback was registered for.
        kind: ListenerKind,
        /// The registered callback.
        callback: ListenerCallback,
    },
}

impl Unsubscribe {
    /// Returns true for a handle issued by the admin SDK.
    pub fn is_admin(&self) -> bool {
        matches!(self, Unsubscribe::Admin { .. })
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsubscribe::Client(_) => f.write_str("Unsubscribe::Client(..)"),
            Unsubscribe::Admin { kind, .. } => f
                .debug_struct("Unsubscribe::Admin")
                .field("kind", kind)
                .finish_non_exhaustive(),
        }
    }
}

/// Compares two callbacks by identity.
///
/// The admin SDK detaches listeners by callback identity, so clones of one
/// `Arc` compare equal and distinct closures never do.
pub fn same_callback(a: &ListenerCallback, b: &ListenerCallback) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
