//! The two backing SDK shapes.
//!
//! Both SDKs expose the same mutations, but they disagree on reads and on
//! listener management:
//!
//! - the admin SDK reads with `once` and detaches listeners with
//!   `off(kind, callback)`, matching the callback by identity;
//! - the client SDK reads with `get` and returns an unsubscribe function
//!   from each listener registration.
//!
//! [`crate::RealtimeBackend`] hides that difference.

use crate::constraints::QueryConstraints;
use crate::error::BackendResult;
use crate::listener::{CancelCallback, ClientUnsubscribe, ListenerCallback, ListenerKind};
use crate::path::DbPath;
use crate::priority::Priority;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A handle for mutations the server runs when this client disconnects.
#[async_trait]
pub trait OnDisconnect: Send + Sync {
    /// Cancels every mutation scheduled at or below the location.
    async fn cancel(&self) -> BackendResult<()>;

    /// Schedules a set.
    async fn set(&self, value: Value) -> BackendResult<()>;

    /// Schedules an update.
    async fn update(&self, values: Map<String, Value>) -> BackendResult<()>;

    /// Schedules a remove.
    async fn remove(&self) -> BackendResult<()>;

    /// Schedules a set with priority.
    async fn set_with_priority(&self, value: Value, priority: Option<Priority>)
        -> BackendResult<()>;
}

/// Mutations and transport control shared by both SDKs.
#[async_trait]
pub trait DatabaseWrites: Send + Sync {
    /// Database URL, for diagnostics.
    fn url(&self) -> String;

    /// Replaces the value at `path`.
    async fn set(&self, path: &DbPath, value: Value) -> BackendResult<()>;

    /// Creates a child with a generated key and returns its path.
    async fn push(&self, path: &DbPath, value: Option<Value>) -> BackendResult<DbPath>;

    /// Merges child paths into `path`.
    async fn update(&self, path: &DbPath, values: Map<String, Value>) -> BackendResult<()>;

    /// Removes the value at `path`.
    async fn remove(&self, path: &DbPath) -> BackendResult<()>;

    /// Sets the priority at `path`.
    async fn set_priority(&self, path: &DbPath, priority: Option<Priority>) -> BackendResult<()>;

    /// Replaces value and priority at `path`.
    async fn set_with_priority(
        &self,
        path: &DbPath,
        value: Value,
        priority: Option<Priority>,
    ) -> BackendResult<()>;

    /// Returns the on-disconnect handle for `path`.
    fn on_disconnect(&self, path: &DbPath) -> Box<dyn OnDisconnect>;

    /// Reconnects the transport.
    fn go_online(&self);

    /// Disconnects the transport.
    fn go_offline(&self);
}

/// The privileged server-side SDK.
#[async_trait]
pub trait AdminDatabase: DatabaseWrites {
    /// Reads the query result once.
    async fn once(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot>;

    /// Registers `callback` for `kind` events.
    ///
    /// `cancel` is invoked at most once if the backend revokes the listener.
    fn on(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    );

    /// Detaches the registration of `callback` for `kind` at `path`.
    fn off(&self, path: &DbPath, kind: ListenerKind, callback: &ListenerCallback);
}

/// The client-scoped browser SDK.
#[async_trait]
pub trait ClientDatabase: DatabaseWrites {
    /// Reads the query result.
    async fn get(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot>;

    /// Registers `callback` for `kind` events and returns the detach function.
    fn listen(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) -> ClientUnsubscribe;
}

/// The database connection owned by the session.
#[derive(Clone)]
pub enum DatabaseHandle {
    /// Admin-privileged connection.
    Admin(Arc<dyn AdminDatabase>),
    /// Client-scoped connection.
    Client(Arc<dyn ClientDatabase>),
}

impl DatabaseHandle {
    /// Returns true for an admin connection.
    pub fn is_admin(&self) -> bool {
        matches!(self, DatabaseHandle::Admin(_))
    }

    /// Describes the handle kind.
    pub fn kind_name(&self) -> &'static str {
        if self.is_admin() {
            "admin"
        } else {
            "client"
        }
    }

    /// Database URL.
    pub fn url(&self) -> String {
        match self {
            DatabaseHandle::Admin(db) => db.url(),
            DatabaseHandle::Client(db) => db.url(),
        }
    }
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("kind", &self.kind_name())
            .field("url", &self.url())
            .finish()
    }
}
