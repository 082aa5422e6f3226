//! The query engine.

use rtbridge_core::{
    BackendError, BridgeResult, CancelCallback, DbPath, ListenerCallback, ListenerKind,
    OnDisconnectMethod, OnDisconnectOp, QueryConstraints, RealtimeBackend, Session, Snapshot,
    Unsubscribe, ValidationError, WriteMethod, WriteOp,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Callbacks for a subscription.
///
/// `on_cancel` runs once if the backend revokes the listener, for example
/// when security rules deny the read. The registration is dead after that
/// and is not retried.
pub struct Subscriber {
    on_event: ListenerCallback,
    on_cancel: Option<CancelCallback>,
}

impl Subscriber {
    /// Creates a subscriber from an event callback.
    pub fn new(on_event: impl Fn(&Snapshot, Option<&str>) + Send + Sync + 'static) -> Self {
        Self::from_callback(Arc::new(on_event))
    }

    /// Creates a subscriber from a shared callback.
    pub fn from_callback(on_event: ListenerCallback) -> Self {
        Self {
            on_event,
            on_cancel: None,
        }
    }

    /// Sets the callback that receives the backend's cancellation error.
    pub fn on_cancel(mut self, on_cancel: impl Fn(&BackendError) + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(on_cancel));
        self
    }
}

/// Validates caller-supplied descriptors and dispatches them to the backend
/// selected for the session.
pub struct QueryEngine {
    backend: Arc<dyn RealtimeBackend>,
}

impl QueryEngine {
    /// Creates an engine bound to the session's backend.
    pub fn new(session: &Session) -> Self {
        Self::with_backend(session.backend())
    }

    /// Creates an engine over an explicit backend.
    pub fn with_backend(backend: Arc<dyn RealtimeBackend>) -> Self {
        Self { backend }
    }

    /// Returns true when dispatching to the admin SDK.
    pub fn is_admin(&self) -> bool {
        self.backend.is_admin()
    }

    /// Reads a location, optionally filtered by a constraint set.
    ///
    /// An absent or blank path reads the root.
    pub async fn do_get_query(
        &self,
        path: Option<&str>,
        constraints: Option<&Value>,
    ) -> BridgeResult<Snapshot> {
        let path = DbPath::parse_optional(path)?;
        let constraints = QueryConstraints::parse(constraints)?;
        self.get(&path, &constraints).await
    }

    /// Reads a validated query.
    pub async fn get(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
    ) -> BridgeResult<Snapshot> {
        debug!(%path, admin = self.is_admin(), "get");
        Ok(self.backend.get(path, constraints).await?)
    }

    /// Attaches a listener and returns the handle to detach it.
    ///
    /// The handle's shape depends on the backend; pass it back unchanged to
    /// [`QueryEngine::do_unsubscription_query`].
    pub fn do_subscription_query(
        &self,
        listener: &str,
        subscriber: Subscriber,
        path: Option<&str>,
        constraints: Option<&Value>,
    ) -> BridgeResult<Unsubscribe> {
        let kind: ListenerKind = listener.parse()?;
        let path = DbPath::parse_optional(path)?;
        let constraints = QueryConstraints::parse(constraints)?;
        Ok(self.subscribe(kind, subscriber, &path, &constraints))
    }

    /// Attaches a validated listener.
    pub fn subscribe(
        &self,
        kind: ListenerKind,
        subscriber: Subscriber,
        path: &DbPath,
        constraints: &QueryConstraints,
    ) -> Unsubscribe {
        let Subscriber { on_event, on_cancel } = subscriber;
        let listener_path = path.clone();
        let cancel: CancelCallback = Arc::new(move |err: &BackendError| {
            error!(path = %listener_path, %kind, error = %err, "listener cancelled by backend");
            if let Some(on_cancel) = &on_cancel {
                on_cancel(err);
            }
        });
        debug!(%path, %kind, admin = self.is_admin(), "subscribe");
        self.backend.on(path, constraints, kind, on_event, cancel)
    }

    /// Detaches the listener behind `handle`. A missing handle is a no-op.
    pub fn do_unsubscription_query(
        &self,
        listener: &str,
        handle: Option<Unsubscribe>,
        path: Option<&str>,
    ) -> BridgeResult<()> {
        let kind: ListenerKind = listener.parse()?;
        let path = DbPath::parse_optional(path)?;
        let Some(handle) = handle else {
            return Ok(());
        };
        if handle.is_admin() != self.is_admin() {
            return Err(ValidationError::InvalidArguments {
                method: "unsubscribe".into(),
                reason: "handle was issued by a different backend".into(),
            }
            .into());
        }
        if let Unsubscribe::Admin {
            kind: registered, ..
        } = &handle
        {
            if *registered != kind {
                return Err(ValidationError::InvalidArguments {
                    method: "unsubscribe".into(),
                    reason: format!("handle was registered for {registered}, not {kind}"),
                }
                .into());
            }
        }
        debug!(%path, %kind, "unsubscribe");
        self.backend.off(&path, kind, handle);
        Ok(())
    }

    /// Applies a write described by a method name and positional arguments.
    ///
    /// Returns the generated child path for `push`.
    pub async fn do_write_query(
        &self,
        method: &str,
        path: &str,
        args: &[Value],
    ) -> BridgeResult<Option<DbPath>> {
        let method: WriteMethod = method.parse()?;
        let path = DbPath::parse(path)?;
        let op = WriteOp::from_args(method, args)?;
        self.write(&path, op).await
    }

    /// Applies a validated write.
    ///
    /// The root and the reserved liveness path are rejected.
    pub async fn write(&self, path: &DbPath, op: WriteOp) -> BridgeResult<Option<DbPath>> {
        path.ensure_writable()?;
        debug!(%path, method = %op.method(), "write");
        Ok(self.backend.write(path, op).await?)
    }

    /// Schedules a mutation for when the connection drops.
    pub async fn set_on_disconnect_query(
        &self,
        method: &str,
        path: &str,
        args: &[Value],
    ) -> BridgeResult<()> {
        let method: OnDisconnectMethod = method.parse()?;
        let path = DbPath::parse(path)?;
        let op = OnDisconnectOp::from_args(method, args)?;
        self.on_disconnect(&path, op).await
    }

    /// Schedules a validated on-disconnect mutation.
    pub async fn on_disconnect(&self, path: &DbPath, op: OnDisconnectOp) -> BridgeResult<()> {
        path.ensure_writable()?;
        Ok(self.backend.on_disconnect(path, op).await?)
    }

    /// Forces the backend transport up.
    pub fn go_online(&self) {
        debug!(url = %self.backend.url(), "going online");
        self.backend.go_online();
    }

    /// Forces the backend transport down.
    pub fn go_offline(&self) {
        debug!(url = %self.backend.url(), "going offline");
        self.backend.go_offline();
    }
}
