//! Connection liveness monitor.

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, ConnectionResult};
use crate::event::{ConnectionEvent, EventFeed};
use crate::state::ConnectionState;
use parking_lot::Mutex;
use rtbridge_core::{
    BackendError, BackendResult, CancelCallback, DbPath, LifecycleObserver, ListenerCallback,
    ListenerKind, OnDisconnectOp, QueryConstraints, RealtimeBackend, Session, SessionEvent,
    Snapshot, Unsubscribe, WriteOp,
};
use serde_json::Value;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// The armed disconnect timer.
struct Timer {
    generation: u64,
    task: JoinHandle<()>,
}

/// A listener detached outside the state lock.
type Detached = (Arc<dyn RealtimeBackend>, Unsubscribe);

#[derive(Default)]
struct MonitorState {
    state: ConnectionState,
    first_connected: bool,
    backend: Option<Arc<dyn RealtimeBackend>>,
    url: String,
    listener: Option<Unsubscribe>,
    timer: Option<Timer>,
    /// Bumped whenever the subscription is replaced or torn down, so that
    /// callbacks and timers from an older subscription are ignored.
    epoch: u64,
    generation: u64,
    last_error: Option<BackendError>,
}

impl MonitorState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            trace!(generation = timer.generation, "disconnect timer cancelled");
            timer.task.abort();
        }
    }

    /// Invalidates the current subscription and returns its listener.
    fn reset(&mut self) -> Option<Detached> {
        self.epoch += 1;
        self.cancel_timer();
        self.state = ConnectionState::Disconnected;
        self.first_connected = false;
        let listener = self.listener.take()?;
        let backend = self.backend.clone()?;
        Some((backend, listener))
    }
}

/// Tracks database connectivity through the `.info/connected` signal.
///
/// The monitor subscribes once per sign-in and turns the raw boolean stream
/// into [`ConnectionState`] transitions. A `false` signal arms a disconnect
/// timer; if no `true` arrives before it expires the state becomes
/// [`ConnectionState::Disconnected`].
///
/// Events are delivered through [`ConnectionMonitor::subscribe`].
pub struct ConnectionMonitor {
    this: Weak<ConnectionMonitor>,
    config: ConnectionConfig,
    runtime: Handle,
    feed: EventFeed<ConnectionEvent>,
    inner: Mutex<MonitorState>,
}

impl ConnectionMonitor {
    /// Creates an idle monitor on the current tokio runtime.
    pub fn new(config: ConnectionConfig) -> ConnectionResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;
        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            runtime,
            feed: EventFeed::new(),
            inner: Mutex::new(MonitorState::default()),
        }))
    }

    /// Registers for the session's lifecycle signals.
    ///
    /// The monitor starts on the next sign-in and stops on sign-out or
    /// deletion.
    pub fn watch(self: &Arc<Self>, session: &Session) {
        session.register(Arc::clone(self) as Arc<dyn LifecycleObserver>);
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<ConnectionEvent> {
        self.feed.subscribe()
    }

    /// Returns true once the current subscription has seen a connection.
    pub fn first_connection_established(&self) -> bool {
        self.inner.lock().first_connected
    }

    /// Returns the error that cancelled the last liveness listener.
    pub fn last_error(&self) -> Option<BackendError> {
        self.inner.lock().last_error.clone()
    }

    /// Returns true while the liveness listener is attached.
    pub fn is_listening(&self) -> bool {
        self.inner.lock().listener.is_some()
    }

    /// Returns true while a disconnect timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    /// Starts monitoring `backend`, replacing any previous subscription.
    ///
    /// The listener is attached on the next scheduler turn.
    pub fn attach(&self, backend: Arc<dyn RealtimeBackend>) {
        let url = backend.url();
        let (epoch, stale) = {
            let mut inner = self.inner.lock();
            let stale = inner.reset();
            inner.backend = Some(Arc::clone(&backend));
            inner.url = url.clone();
            inner.last_error = None;
            (inner.epoch, stale)
        };
        release(stale);

        info!(%url, admin = backend.is_admin(), "monitoring connection");
        self.feed
            .emit(ConnectionEvent::Log(format!("monitoring connection to {url}")));

        let this = self.this.clone();
        self.runtime.spawn(async move {
            if let Some(monitor) = this.upgrade() {
                monitor.listen(epoch, backend);
            }
        });
    }

    /// Subscribes again to the attached backend, typically after a listener
    /// error.
    pub fn resubscribe(&self) -> ConnectionResult<()> {
        let backend = self
            .inner
            .lock()
            .backend
            .clone()
            .ok_or(ConnectionError::NoSession)?;
        self.attach(backend);
        Ok(())
    }

    /// Stops monitoring and forgets the backend.
    ///
    /// The state returns to [`ConnectionState::Disconnected`] without a
    /// `disconnected` event.
    pub fn detach(&self) {
        let (stale, url) = {
            let mut inner = self.inner.lock();
            let stale = inner.reset();
            inner.backend = None;
            (stale, std::mem::take(&mut inner.url))
        };
        release(stale);

        if !url.is_empty() {
            info!(%url, "stopped monitoring connection");
            self.feed
                .emit(ConnectionEvent::Log(format!("stopped monitoring connection to {url}")));
        }
    }

    fn listen(&self, epoch: u64, backend: Arc<dyn RealtimeBackend>) {
        if self.inner.lock().epoch != epoch {
            return;
        }

        let this = self.this.clone();
        let on_signal: ListenerCallback = Arc::new(move |snapshot: &Snapshot, _: Option<&str>| {
            if let Some(monitor) = this.upgrade() {
                monitor.handle_signal(epoch, snapshot.value().as_bool().unwrap_or(false));
            }
        });
        let this = self.this.clone();
        let on_cancel: CancelCallback = Arc::new(move |err: &BackendError| {
            if let Some(monitor) = this.upgrade() {
                monitor.handle_listener_error(epoch, err);
            }
        });

        // Initial values may be delivered before `on` returns.
        let path = DbPath::info_connected();
        let handle = backend.on(
            &path,
            &QueryConstraints::default(),
            ListenerKind::Value,
            on_signal,
            on_cancel,
        );

        let mut inner = self.inner.lock();
        if inner.epoch == epoch {
            debug!(epoch, "liveness listener attached");
            inner.listener = Some(handle);
        } else {
            drop(inner);
            debug!(epoch, "subscription replaced before attach completed");
            backend.off(&path, ListenerKind::Value, handle);
        }
    }

    fn handle_signal(&self, epoch: u64, connected: bool) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            trace!(epoch, "ignoring signal from a stale subscription");
            return;
        }
        if connected {
            self.on_connected(&mut inner);
        } else {
            self.on_dropped(&mut inner, epoch);
        }
    }

    fn on_connected(&self, inner: &mut MonitorState) {
        inner.cancel_timer();
        if inner.state == ConnectionState::Connected {
            return;
        }
        inner.state = ConnectionState::Connected;
        inner.first_connected = true;
        info!(url = %inner.url, "connected");
        self.feed.emit(ConnectionEvent::Connected);

        if let (Some(path), Some(backend)) = (&self.config.presence_path, &inner.backend) {
            let path = path.clone();
            let backend = Arc::clone(backend);
            let this = self.this.clone();
            self.runtime.spawn(async move {
                if let Err(err) = mark_present(backend.as_ref(), &path).await {
                    warn!(%path, error = %err, "presence marker failed");
                    if let Some(monitor) = this.upgrade() {
                        monitor.feed.emit(ConnectionEvent::Log(format!(
                            "presence marker at {path} failed: {err}"
                        )));
                    }
                }
            });
        }
    }

    fn on_dropped(&self, inner: &mut MonitorState, epoch: u64) {
        self.arm_timer(inner, epoch);

        let previous = inner.state;
        let (next, event) = if inner.first_connected {
            (ConnectionState::Reconnecting, ConnectionEvent::Reconnecting)
        } else {
            (ConnectionState::Connecting, ConnectionEvent::Connecting)
        };
        if previous == next {
            return;
        }
        inner.state = next;
        debug!(url = %inner.url, from = %previous, to = %next, "liveness lost");
        self.feed.emit(event);
        // Only a live connection can drop. A `false` arriving after the
        // timer already fired moves to RECONNECTING without `disconnect`.
        if previous == ConnectionState::Connected {
            self.feed.emit(ConnectionEvent::Disconnect);
        }
    }

    fn arm_timer(&self, inner: &mut MonitorState, epoch: u64) {
        inner.cancel_timer();
        inner.generation += 1;
        let generation = inner.generation;
        let timeout = self.config.disconnect_timeout;
        let this = self.this.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(monitor) = this.upgrade() {
                monitor.expire(epoch, generation);
            }
        });
        trace!(generation, ?timeout, "disconnect timer armed");
        inner.timer = Some(Timer { generation, task });
    }

    fn expire(&self, epoch: u64, generation: u64) {
        let mut inner = self.inner.lock();
        let current = inner.timer.as_ref().map(|t| t.generation);
        if inner.epoch != epoch || current != Some(generation) {
            return;
        }
        inner.timer = None;
        if inner.state == ConnectionState::Disconnected {
            return;
        }
        inner.state = ConnectionState::Disconnected;
        warn!(url = %inner.url, "connection lost");
        self.feed.emit(ConnectionEvent::Disconnected);
    }

    fn handle_listener_error(&self, epoch: u64, err: &BackendError) {
        let stale = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return;
            }
            error!(url = %inner.url, error = %err, "liveness listener cancelled");
            inner.last_error = Some(err.clone());
            self.feed.emit(ConnectionEvent::Error(err.clone()));
            self.feed.emit(ConnectionEvent::Log(format!(
                "liveness listener for {} cancelled: {err}",
                inner.url
            )));
            inner.reset()
        };
        release(stale);
    }
}

impl LifecycleObserver for ConnectionMonitor {
    fn on_session_event(&self, event: SessionEvent, session: &Session) {
        match event {
            SessionEvent::SignedIn => self.attach(session.backend()),
            SessionEvent::SignedOut | SessionEvent::Deleting => self.detach(),
        }
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        let stale = self.inner.get_mut().reset();
        release(stale);
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConnectionMonitor")
            .field("state", &inner.state)
            .field("url", &inner.url)
            .field("first_connected", &inner.first_connected)
            .finish_non_exhaustive()
    }
}

fn release(stale: Option<Detached>) {
    if let Some((backend, listener)) = stale {
        backend.off(&DbPath::info_connected(), ListenerKind::Value, listener);
    }
}

/// Schedules `false` for disconnect, then writes `true`.
async fn mark_present(backend: &dyn RealtimeBackend, path: &DbPath) -> BackendResult<()> {
    backend
        .on_disconnect(path, OnDisconnectOp::Set(Value::Bool(false)))
        .await?;
    backend.write(path, WriteOp::Set(Value::Bool(true))).await?;
    Ok(())
}
