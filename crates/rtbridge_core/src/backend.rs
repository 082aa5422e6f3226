//! Unified capability interface over the two SDK shapes.

use crate::constraints::QueryConstraints;
use crate::error::BackendResult;
use crate::listener::{CancelCallback, ListenerCallback, ListenerKind, Unsubscribe};
use crate::method::{OnDisconnectOp, WriteOp};
use crate::path::DbPath;
use crate::sdk::{AdminDatabase, ClientDatabase, DatabaseHandle, DatabaseWrites};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Operations the query engine and connection monitor need from a backend.
///
/// There is one implementation per SDK shape; [`DatabaseHandle::backend`]
/// picks it once per session.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Returns true for the admin SDK.
    fn is_admin(&self) -> bool;

    /// Database URL.
    fn url(&self) -> String;

    /// Reads the query result.
    async fn get(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot>;

    /// Attaches a listener and returns its unsubscription handle.
    fn on(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) -> Unsubscribe;

    /// Detaches the listener behind `handle`.
    fn off(&self, path: &DbPath, kind: ListenerKind, handle: Unsubscribe);

    /// Applies a write. Returns the generated child path for `push`.
    async fn write(&self, path: &DbPath, op: WriteOp) -> BackendResult<Option<DbPath>>;

    /// Schedules a mutation to run when the connection drops.
    async fn on_disconnect(&self, path: &DbPath, op: OnDisconnectOp) -> BackendResult<()>;

    /// Reconnects the transport.
    fn go_online(&self);

    /// Disconnects the transport.
    fn go_offline(&self);
}

impl DatabaseHandle {
    /// Selects the backend adapter matching this handle.
    pub fn backend(&self) -> Arc<dyn RealtimeBackend> {
        match self {
            DatabaseHandle::Admin(db) => Arc::new(AdminBackend::new(Arc::clone(db))),
            DatabaseHandle::Client(db) => Arc::new(ClientBackend::new(Arc::clone(db))),
        }
    }
}

async fn dispatch_write<D>(db: &D, path: &DbPath, op: WriteOp) -> BackendResult<Option<DbPath>>
where
    D: DatabaseWrites + ?Sized,
{
    debug!(method = %op.method(), %path, "dispatching write");
    match op {
        WriteOp::Set(value) => db.set(path, value).await.map(|_| None),
        WriteOp::Push(value) => db.push(path, value).await.map(Some),
        WriteOp::Update(values) => db.update(path, values).await.map(|_| None),
        WriteOp::Remove => db.remove(path).await.map(|_| None),
        WriteOp::SetPriority(priority) => db.set_priority(path, priority).await.map(|_| None),
        WriteOp::SetWithPriority(value, priority) => db
            .set_with_priority(path, value, priority)
            .await
            .map(|_| None),
    }
}

async fn dispatch_on_disconnect<D>(db: &D, path: &DbPath, op: OnDisconnectOp) -> BackendResult<()>
where
    D: DatabaseWrites + ?Sized,
{
    debug!(method = %op.method(), %path, "scheduling on-disconnect mutation");
    let handle = db.on_disconnect(path);
    match op {
        OnDisconnectOp::Cancel => handle.cancel().await,
        OnDisconnectOp::Set(value) => handle.set(value).await,
        OnDisconnectOp::Update(values) => handle.update(values).await,
        OnDisconnectOp::Remove => handle.remove().await,
        OnDisconnectOp::SetWithPriority(value, priority) => {
            handle.set_with_priority(value, priority).await
        }
    }
}

/// Backend adapter for the admin SDK.
pub struct AdminBackend {
    db: Arc<dyn AdminDatabase>,
}

impl AdminBackend {
    /// Wraps an admin database.
    pub fn new(db: Arc<dyn AdminDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RealtimeBackend for AdminBackend {
    fn is_admin(&self) -> bool {
        true
    }

    fn url(&self) -> String {
        self.db.url()
    }

    async fn get(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot> {
        self.db.once(path, constraints).await
    }

    fn on(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) -> Unsubscribe {
        self.db
            .on(path, constraints, kind, Arc::clone(&callback), cancel);
        Unsubscribe::Admin { kind, callback }
    }

    fn off(&self, path: &DbPath, kind: ListenerKind, handle: Unsubscribe) {
        match handle {
            Unsubscribe::Admin {
                kind: registered,
                callback,
            } => {
                if registered != kind {
                    warn!(
                        %registered,
                        requested = %kind,
                        "detaching admin listener under its registered kind"
                    );
                }
                self.db.off(path, registered, &callback);
            }
            Unsubscribe::Client(unsubscribe) => {
                warn!(%path, "client unsubscribe handle passed to admin backend");
                unsubscribe();
            }
        }
    }

    async fn write(&self, path: &DbPath, op: WriteOp) -> BackendResult<Option<DbPath>> {
        dispatch_write(&*self.db, path, op).await
    }

    async fn on_disconnect(&self, path: &DbPath, op: OnDisconnectOp) -> BackendResult<()> {
        dispatch_on_disconnect(&*self.db, path, op).await
    }

    fn go_online(&self) {
        self.db.go_online();
    }

    fn go_offline(&self) {
        self.db.go_offline();
    }
}

/// Backend adapter for the client SDK.
pub struct ClientBackend {
    db: Arc<dyn ClientDatabase>,
}

impl ClientBackend {
    /// Wraps a client database.
    pub fn new(db: Arc<dyn ClientDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RealtimeBackend for ClientBackend {
    fn is_admin(&self) -> bool {
        false
    }

    fn url(&self) -> String {
        self.db.url()
    }

    async fn get(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot> {
        self.db.get(path, constraints).await
    }

    fn on(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) -> Unsubscribe {
        Unsubscribe::Client(self.db.listen(path, constraints, kind, callback, cancel))
    }

    fn off(&self, path: &DbPath, _kind: ListenerKind, handle: Unsubscribe) {
        match handle {
            Unsubscribe::Client(unsubscribe) => unsubscribe(),
            Unsubscribe::Admin { .. } => {
                warn!(%path, "admin unsubscribe handle passed to client backend; ignoring");
            }
        }
    }

    async fn write(&self, path: &DbPath, op: WriteOp) -> BackendResult<Option<DbPath>> {
        dispatch_write(&*self.db, path, op).await
    }

    async fn on_disconnect(&self, path: &DbPath, op: OnDisconnectOp) -> BackendResult<()> {
        dispatch_on_disconnect(&*self.db, path, op).await
    }

    fn go_online(&self) {
        self.db.go_online();
    }

    fn go_offline(&self) {
        self.db.go_offline();
    }
}
