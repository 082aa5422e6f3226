//! The session collaborator surface.
//!
//! Bootstrapping the app and signing in happen elsewhere. The core needs the
//! admin flag, the database handle, and notifications when the session
//! signs in, signs out, or is being deleted.

use crate::backend::RealtimeBackend;
use crate::error::{ValidationError, ValidationResult};
use crate::sdk::DatabaseHandle;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Lifecycle signals emitted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// Sign-in completed; the database handle is ready.
    SignedIn,
    /// The user signed out.
    SignedOut,
    /// The session is being deleted; its handle becomes invalid.
    Deleting,
}

/// Receives session lifecycle signals.
pub trait LifecycleObserver: Send + Sync {
    /// Called synchronously for each lifecycle signal.
    fn on_session_event(&self, event: SessionEvent, session: &Session);
}

/// An authenticated session with its database connection.
pub struct Session {
    admin: bool,
    handle: DatabaseHandle,
    backend: Arc<dyn RealtimeBackend>,
    observers: RwLock<Vec<Weak<dyn LifecycleObserver>>>,
}

impl Session {
    /// Creates a session.
    ///
    /// Fails if the `admin` flag disagrees with the kind of `handle`.
    pub fn new(admin: bool, handle: DatabaseHandle) -> ValidationResult<Self> {
        if admin != handle.is_admin() {
            return Err(ValidationError::BackendMismatch {
                expected: if admin { "admin" } else { "client" },
                actual: handle.kind_name(),
            });
        }
        let backend = handle.backend();
        Ok(Self {
            admin,
            handle,
            backend,
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Returns true for an admin-privileged session.
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// The database handle.
    pub fn handle(&self) -> &DatabaseHandle {
        &self.handle
    }

    /// The backend adapter selected for this session.
    pub fn backend(&self) -> Arc<dyn RealtimeBackend> {
        Arc::clone(&self.backend)
    }

    /// Database URL.
    pub fn url(&self) -> String {
        self.backend.url()
    }

    /// Registers an observer. Observers are held weakly.
    pub fn register(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.write().push(Arc::downgrade(&observer));
    }

    /// Returns the number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    /// Signals that sign-in completed.
    pub fn signed_in(&self) {
        self.notify(SessionEvent::SignedIn);
    }

    /// Signals sign-out.
    pub fn signed_out(&self) {
        self.notify(SessionEvent::SignedOut);
    }

    /// Signals that the session is being deleted.
    pub fn deleting(&self) {
        self.notify(SessionEvent::Deleting);
    }

    fn notify(&self, event: SessionEvent) {
        let observers: Vec<Arc<dyn LifecycleObserver>> = {
            let mut observers = self.observers.write();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        debug!(?event, observers = observers.len(), "session lifecycle event");
        for observer in observers {
            observer.on_session_event(event, self);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("admin", &self.admin)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
