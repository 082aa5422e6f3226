//! The session surface and both backend adapters over the in-memory database.

use parking_lot::Mutex;
use rtbridge_core::{
    BackendError, BackendErrorCode, CancelCallback, DbPath, LifecycleObserver, ListenerCallback,
    ListenerKind, OnDisconnectOp, QueryConstraints, RealtimeBackend, Session, SessionEvent,
    Snapshot, Unsubscribe, ValidationError, WriteOp,
};
use rtbridge_testkit::MemoryDatabase;
use serde_json::json;
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(SessionEvent, bool)>>,
}

impl LifecycleObserver for Recorder {
    fn on_session_event(&self, event: SessionEvent, session: &Session) {
        self.events.lock().push((event, session.is_admin()));
    }
}

fn path(raw: &str) -> DbPath {
    DbPath::parse(raw).unwrap()
}

fn noop() -> ListenerCallback {
    Arc::new(|_: &Snapshot, _: Option<&str>| {})
}

fn ignore_cancel() -> CancelCallback {
    Arc::new(|_: &BackendError| {})
}

#[test]
fn session_rejects_mismatched_handle() {
    let db = MemoryDatabase::new("memory://session");
    let err = Session::new(true, db.client_handle()).unwrap_err();
    assert_eq!(
        err,
        ValidationError::BackendMismatch {
            expected: "admin",
            actual: "client",
        }
    );
    assert!(Session::new(false, db.admin_handle()).is_err());
}

#[test]
fn session_selects_backend_once() {
    let db = MemoryDatabase::new("memory://session");
    let admin = Session::new(true, db.admin_handle()).unwrap();
    let client = Session::new(false, db.client_handle()).unwrap();

    assert!(admin.backend().is_admin());
    assert!(!client.backend().is_admin());
    assert_eq!(admin.url(), "memory://session");
    assert!(Arc::ptr_eq(&admin.backend(), &admin.backend()));
    assert_eq!(client.handle().kind_name(), "client");
}

#[test]
fn observers_receive_lifecycle_events() {
    let db = MemoryDatabase::new("memory://session");
    let session = Session::new(true, db.admin_handle()).unwrap();
    let recorder = Arc::new(Recorder::default());
    session.register(Arc::clone(&recorder) as Arc<dyn LifecycleObserver>);
    assert_eq!(session.observer_count(), 1);

    session.signed_in();
    session.signed_out();
    session.deleting();
    assert_eq!(
        *recorder.events.lock(),
        vec![
            (SessionEvent::SignedIn, true),
            (SessionEvent::SignedOut, true),
            (SessionEvent::Deleting, true),
        ]
    );

    drop(recorder);
    assert_eq!(session.observer_count(), 0);
    session.signed_in();
}

#[test]
fn admin_off_matches_the_callback() {
    let db = MemoryDatabase::new("memory://admin");
    let backend = db.admin_handle().backend();
    let at = path("rooms");
    let constraints = QueryConstraints::default();

    let kept = backend.on(&at, &constraints, ListenerKind::Value, noop(), ignore_cancel());
    let removed = backend.on(&at, &constraints, ListenerKind::Value, noop(), ignore_cancel());
    assert_eq!(db.listener_count(), 2);

    // Detached under the kind it was registered with.
    backend.off(&at, ListenerKind::ChildAdded, removed);
    assert_eq!(db.listener_count(), 1);

    backend.off(&at, ListenerKind::Value, kept);
    assert_eq!(db.listener_count(), 0);
}

#[test]
fn mismatched_handles() {
    let db = MemoryDatabase::new("memory://mixed");
    let admin = db.admin_handle().backend();
    let client = db.client_handle().backend();
    let at = path("x");
    let constraints = QueryConstraints::default();

    let admin_handle = admin.on(&at, &constraints, ListenerKind::Value, noop(), ignore_cancel());
    client.off(&at, ListenerKind::Value, admin_handle);
    assert_eq!(db.listener_count(), 1);

    let client_handle = client.on(&at, &constraints, ListenerKind::Value, noop(), ignore_cancel());
    assert!(matches!(client_handle, Unsubscribe::Client(_)));
    admin.off(&at, ListenerKind::Value, client_handle);
    assert_eq!(db.listener_count(), 1);
}

#[tokio::test]
async fn writes_dispatch_through_either_adapter() {
    for admin in [true, false] {
        let db = MemoryDatabase::new("memory://writes");
        let backend = if admin {
            db.admin_handle().backend()
        } else {
            db.client_handle().backend()
        };

        backend
            .write(&path("a"), WriteOp::Set(json!({"b": 1})))
            .await
            .unwrap();
        let pushed = backend
            .write(&path("list"), WriteOp::Push(Some(json!("item"))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(db.value(pushed.as_str()), json!("item"));

        let snapshot = backend
            .get(&path("a"), &QueryConstraints::default())
            .await
            .unwrap();
        assert_eq!(snapshot.value(), &json!({"b": 1}));

        backend
            .on_disconnect(&path("a/b"), OnDisconnectOp::Remove)
            .await
            .unwrap();
        assert_eq!(db.pending_on_disconnect(), 1);

        let err = backend
            .write(&path("a"), WriteOp::Set(json!({"bad$key": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.code, BackendErrorCode::Other);
    }
}
