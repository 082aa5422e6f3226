//! Integration tests for the query engine against the in-memory database.

use parking_lot::Mutex;
use proptest::prelude::*;
use rtbridge_core::{
    BackendError, BackendErrorCode, BridgeError, DbPath, ListenerKind, OnDisconnectOp, Priority,
    Session, Unsubscribe, ValidationError, WriteOp,
};
use rtbridge_query::{QueryEngine, Subscriber};
use rtbridge_testkit::generators::{
    constraints_strategy, constraints_with_unknown_key_strategy, invalid_path_strategy,
    non_object_strategy, path_strategy,
};
use rtbridge_testkit::MemoryDatabase;
use serde_json::{json, Value};
use std::sync::Arc;

fn engine(db: &MemoryDatabase, admin: bool) -> QueryEngine {
    let handle = if admin {
        db.admin_handle()
    } else {
        db.client_handle()
    };
    let session = Session::new(admin, handle).unwrap();
    QueryEngine::new(&session)
}

/// One engine per backend shape, over separate databases.
fn engines() -> Vec<(MemoryDatabase, QueryEngine)> {
    [true, false]
        .into_iter()
        .map(|admin| {
            let db = MemoryDatabase::new("memory://engine-tests");
            let engine = engine(&db, admin);
            (db, engine)
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

type Events = Arc<Mutex<Vec<(Value, Option<String>)>>>;

fn recording() -> (Events, Subscriber) {
    let events: Events = Arc::default();
    let sink = Arc::clone(&events);
    let subscriber = Subscriber::new(move |snapshot, previous| {
        sink.lock()
            .push((snapshot.value().clone(), previous.map(str::to_string)));
    });
    (events, subscriber)
}

async fn seed_people(engine: &QueryEngine) {
    engine
        .do_write_query(
            "set",
            "people",
            &[json!({
                "alice": {"age": 30},
                "bob": {"age": 25},
                "carol": {"age": 41},
            })],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn get_reads_root_and_paths() {
    for (_db, engine) in engines() {
        seed_people(&engine).await;

        let root = engine.do_get_query(None, None).await.unwrap();
        assert!(root.path().is_root());
        assert_eq!(root.value()["people"]["bob"]["age"], json!(25));

        let blank = engine.do_get_query(Some("  "), None).await.unwrap();
        assert_eq!(blank.value(), root.value());

        let bob = engine.do_get_query(Some("/people/bob/"), None).await.unwrap();
        assert_eq!(bob.key(), Some("bob"));
        assert_eq!(bob.value(), &json!({"age": 25}));

        let missing = engine.do_get_query(Some("people/dave"), None).await.unwrap();
        assert!(!missing.exists());
    }
}

#[tokio::test]
async fn get_applies_constraints() {
    for (_db, engine) in engines() {
        seed_people(&engine).await;
        let constraints = json!({
            "orderByChild": "age",
            "startAt": {"value": 26},
            "limitToFirst": 1,
        });
        let snapshot = engine
            .do_get_query(Some("people"), Some(&constraints))
            .await
            .unwrap();
        assert_eq!(snapshot.child_keys(), vec!["alice"]);
        assert_eq!(snapshot.value(), &json!({"alice": {"age": 30}}));

        let by_key = json!({"orderByKey": null, "limitToLast": 2});
        let snapshot = engine
            .do_get_query(Some("people"), Some(&by_key))
            .await
            .unwrap();
        assert_eq!(snapshot.child_keys(), vec!["bob", "carol"]);
    }
}

#[tokio::test]
async fn null_constraints_mean_none() {
    for (_db, engine) in engines() {
        seed_people(&engine).await;
        let snapshot = engine
            .do_get_query(Some("people"), Some(&Value::Null))
            .await
            .unwrap();
        assert_eq!(snapshot.child_keys().len(), 3);
    }
}

#[tokio::test]
async fn malformed_queries_never_reach_the_backend() {
    for (db, engine) in engines() {
        let cases: Vec<(Option<&str>, Value)> = vec![
            (Some("a.b"), Value::Null),
            (None, json!("orderByKey")),
            (None, json!({"orderBy": null})),
            (None, json!({"orderByKey": null, "orderByValue": null})),
            (None, json!({"startAt": {"value": 1}, "equalTo": {"value": 1}})),
            (None, json!({"limitToFirst": 0})),
            (None, json!({"startAt": 5})),
        ];
        for (path, constraints) in cases {
            let err = engine
                .do_get_query(path, Some(&constraints))
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{err}");
        }
        assert_eq!(db.backend_calls(), 0);
    }
}

#[tokio::test]
async fn backend_errors_propagate_unmodified() {
    for (db, engine) in engines() {
        let denied = BackendError::permission_denied("rules rejected read");
        db.fail_next(denied.clone());
        let err = engine.do_get_query(Some("secret"), None).await.unwrap_err();
        assert!(err.is_backend());
        assert_eq!(err, BridgeError::Backend(denied));

        db.fail_next(BackendError::network("socket closed"));
        let err = engine
            .do_write_query("set", "a", &[json!(1)])
            .await
            .unwrap_err();
        match err {
            BridgeError::Backend(e) => assert_eq!(e.code, BackendErrorCode::Network),
            other => panic!("expected backend error, got {other}"),
        }
    }
}

#[tokio::test]
async fn write_methods() {
    for (db, engine) in engines() {
        engine
            .do_write_query("set", "rooms/lobby", &[json!({"topic": "hi"})])
            .await
            .unwrap();
        assert_eq!(db.value("rooms/lobby/topic"), json!("hi"));

        engine
            .do_write_query("update", "rooms/lobby", &[json!({"topic": "bye", "meta/open": true})])
            .await
            .unwrap();
        assert_eq!(db.value("rooms/lobby"), json!({"topic": "bye", "meta": {"open": true}}));

        engine
            .do_write_query("setWithPriority", "rooms/lobby/topic", &[json!("x"), json!(7)])
            .await
            .unwrap();
        assert_eq!(db.priority("rooms/lobby/topic"), Priority::new(7));

        engine
            .do_write_query("setPriority", "rooms/lobby/topic", &[json!("9")])
            .await
            .unwrap();
        assert_eq!(db.priority("rooms/lobby/topic"), Priority::new(9));

        engine
            .do_write_query("setPriority", "rooms/lobby/topic", &[Value::Null])
            .await
            .unwrap();
        assert_eq!(db.priority("rooms/lobby/topic"), None);

        engine
            .do_write_query("remove", "rooms/lobby", &[])
            .await
            .unwrap();
        assert_eq!(db.value("rooms"), Value::Null);
    }
}

#[tokio::test]
async fn push_returns_the_generated_child() {
    for (db, engine) in engines() {
        let first = engine
            .do_write_query("push", "messages", &[json!({"text": "one"})])
            .await
            .unwrap()
            .unwrap();
        let second = engine
            .do_write_query("push", "messages", &[json!({"text": "two"})])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.parent().unwrap().as_str(), "messages");
        assert!(first.key().unwrap() < second.key().unwrap());
        assert_eq!(db.value(first.as_str()), json!({"text": "one"}));

        let reserved = engine
            .do_write_query("push", "messages", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(db.value(reserved.as_str()), Value::Null);

        let plain = engine
            .do_write_query("set", "messages/x", &[json!(1)])
            .await
            .unwrap();
        assert!(plain.is_none());
    }
}

#[tokio::test]
async fn write_validation() {
    for (db, engine) in engines() {
        let cases: Vec<(&str, &str, Vec<Value>)> = vec![
            ("transaction", "a", vec![json!(1)]),
            ("set", "", vec![json!(1)]),
            ("set", "a$b", vec![json!(1)]),
            ("set", "a", vec![]),
            ("set", "a", vec![json!(1), json!(2)]),
            ("update", "a", vec![json!([1, 2])]),
            ("update", "a", vec![json!({"b#": 1})]),
            ("remove", "a", vec![json!(1)]),
            ("setPriority", "a", vec![json!(-3)]),
            ("setPriority", "a", vec![json!(true)]),
            ("setWithPriority", "a", vec![json!(1)]),
        ];
        for (method, path, args) in cases {
            let err = engine.do_write_query(method, path, &args).await.unwrap_err();
            assert!(err.is_validation(), "{method} {path}: {err}");
        }
        let err = engine
            .do_write_query("transaction", "a", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Validation(ValidationError::UnknownMethod { family: "write", .. })
        ));
        assert_eq!(db.backend_calls(), 0);
    }
}

#[tokio::test]
async fn typed_writes_refuse_root_and_liveness_paths() {
    for (db, engine) in engines() {
        seed_people(&engine).await;
        let before = db.value("");
        let calls = db.backend_calls();

        for path in [DbPath::root(), DbPath::default(), DbPath::info_connected()] {
            let err = engine
                .write(&path, WriteOp::Set(json!({"wiped": true})))
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{path}: {err}");

            let err = engine
                .on_disconnect(&path, OnDisconnectOp::Remove)
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{path}: {err}");
        }

        assert_eq!(db.backend_calls(), calls);
        assert_eq!(db.value(""), before);
        assert_eq!(db.pending_on_disconnect(), 0);
    }
}

#[tokio::test]
async fn value_subscription_until_unsubscribed() {
    for (db, engine) in engines() {
        let (events, subscriber) = recording();
        let handle = engine
            .do_subscription_query("value", subscriber, Some("counter"), None)
            .unwrap();
        assert_eq!(handle.is_admin(), engine.is_admin());
        assert_eq!(db.listener_count(), 1);

        engine.do_write_query("set", "counter", &[json!(1)]).await.unwrap();
        engine.do_write_query("set", "counter", &[json!(2)]).await.unwrap();
        assert_eq!(
            events
                .lock()
                .iter()
                .map(|(v, _)| v.clone())
                .collect::<Vec<_>>(),
            vec![Value::Null, json!(1), json!(2)]
        );

        engine
            .do_unsubscription_query("value", Some(handle), Some("counter"))
            .unwrap();
        assert_eq!(db.listener_count(), 0);

        engine.do_write_query("set", "counter", &[json!(3)]).await.unwrap();
        assert_eq!(events.lock().len(), 3);
    }
}

#[tokio::test]
async fn child_events_carry_previous_key() {
    for (_db, engine) in engines() {
        engine
            .do_write_query("set", "scores", &[json!({"a": 1, "b": 5})])
            .await
            .unwrap();
        let constraints = json!({"orderByValue": null});

        let (added, subscriber) = recording();
        let added_handle = engine
            .do_subscription_query("child_added", subscriber, Some("scores"), Some(&constraints))
            .unwrap();
        let (changed, subscriber) = recording();
        let changed_handle = engine
            .do_subscription_query("child_changed", subscriber, Some("scores"), Some(&constraints))
            .unwrap();
        let (removed, subscriber) = recording();
        let removed_handle = engine
            .do_subscription_query("child_removed", subscriber, Some("scores"), Some(&constraints))
            .unwrap();

        assert_eq!(
            *added.lock(),
            vec![(json!(1), None), (json!(5), Some("a".to_string()))]
        );

        engine
            .do_write_query("set", "scores/c", &[json!(3)])
            .await
            .unwrap();
        assert_eq!(added.lock().last(), Some(&(json!(3), Some("a".to_string()))));

        engine
            .do_write_query("set", "scores/a", &[json!(2)])
            .await
            .unwrap();
        assert_eq!(*changed.lock(), vec![(json!(2), None)]);

        engine.do_write_query("remove", "scores/b", &[]).await.unwrap();
        assert_eq!(*removed.lock(), vec![(json!(5), None)]);

        for (kind, handle) in [
            ("child_added", added_handle),
            ("child_changed", changed_handle),
            ("child_removed", removed_handle),
        ] {
            engine
                .do_unsubscription_query(kind, Some(handle), Some("scores"))
                .unwrap();
        }
    }
}

#[tokio::test]
async fn subscription_validation() {
    for (db, engine) in engines() {
        let err = engine
            .do_subscription_query("child_renamed", Subscriber::new(|_, _| {}), None, None)
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::Validation(ValidationError::UnknownListener("child_renamed".into()))
        );

        let err = engine
            .do_subscription_query("value", Subscriber::new(|_, _| {}), Some("a[0]"), None)
            .unwrap_err();
        assert!(err.is_validation());

        let err = engine
            .do_subscription_query(
                "value",
                Subscriber::new(|_, _| {}),
                None,
                Some(&json!({"limitToFirst": 1, "limitToLast": 1})),
            )
            .unwrap_err();
        assert!(err.is_validation());

        assert_eq!(db.backend_calls(), 0);
        assert_eq!(db.listener_count(), 0);
    }
}

#[tokio::test]
async fn cancelled_listeners_notify_the_subscriber() {
    for (db, engine) in engines() {
        let cancelled: Arc<Mutex<Vec<BackendError>>> = Arc::default();
        let sink = Arc::clone(&cancelled);
        let subscriber = Subscriber::new(|_, _| {})
            .on_cancel(move |err| sink.lock().push(err.clone()));
        engine
            .do_subscription_query("value", subscriber, Some("private"), None)
            .unwrap();

        let error = BackendError::permission_denied("access revoked");
        db.cancel_listeners(error.clone());
        assert_eq!(*cancelled.lock(), vec![error]);
    }
}

#[tokio::test]
async fn denied_registration_reaches_the_cancel_callback() {
    for (db, engine) in engines() {
        db.deny_listeners(Some(BackendError::permission_denied("no read")));
        let cancelled = Arc::new(Mutex::new(0));
        let count = Arc::clone(&cancelled);
        let (events, subscriber) = recording();
        let handle = engine
            .do_subscription_query(
                "value",
                subscriber.on_cancel(move |_| *count.lock() += 1),
                Some("x"),
                None,
            )
            .unwrap();
        assert_eq!(*cancelled.lock(), 1);
        assert!(events.lock().is_empty());

        // Detaching a dead registration is harmless.
        engine
            .do_unsubscription_query("value", Some(handle), Some("x"))
            .unwrap();
    }
}

#[tokio::test]
async fn unsubscribe_without_handle_is_a_noop() {
    for (db, engine) in engines() {
        engine
            .do_unsubscription_query("value", None, Some("anything"))
            .unwrap();
        assert_eq!(db.backend_calls(), 0);

        let err = engine
            .do_unsubscription_query("child_copied", None, None)
            .unwrap_err();
        assert!(err.is_validation());
    }
}

#[tokio::test]
async fn admin_unsubscribe_rejects_kind_mismatch() {
    let db = MemoryDatabase::new("memory://admin");
    let engine = engine(&db, true);
    let handle = engine
        .do_subscription_query("child_added", Subscriber::new(|_, _| {}), Some("feed"), None)
        .unwrap();
    assert!(matches!(
        handle,
        Unsubscribe::Admin {
            kind: ListenerKind::ChildAdded,
            ..
        }
    ));

    let err = engine
        .do_unsubscription_query("value", Some(handle), Some("feed"))
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(db.listener_count(), 1);
}

#[tokio::test]
async fn handles_are_bound_to_their_backend() {
    let db = MemoryDatabase::new("memory://mixed");
    let admin = engine(&db, true);
    let client = engine(&db, false);

    let handle = client
        .do_subscription_query("value", Subscriber::new(|_, _| {}), Some("x"), None)
        .unwrap();
    let err = admin
        .do_unsubscription_query("value", Some(handle), Some("x"))
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn on_disconnect_mutations() {
    for (db, engine) in engines() {
        engine.go_online();
        assert!(db.is_connected());

        engine
            .set_on_disconnect_query("set", "presence/me", &[json!("offline")])
            .await
            .unwrap();
        engine
            .set_on_disconnect_query("update", "rooms/a", &[json!({"users/me": null})])
            .await
            .unwrap();
        engine
            .set_on_disconnect_query("setWithPriority", "last_seen", &[json!(1), json!(2)])
            .await
            .unwrap();
        assert_eq!(db.pending_on_disconnect(), 3);

        engine
            .set_on_disconnect_query("cancel", "rooms", &[])
            .await
            .unwrap();
        assert_eq!(db.pending_on_disconnect(), 2);

        db.simulate_disconnect();
        assert_eq!(db.value("presence/me"), json!("offline"));
        assert_eq!(db.priority("last_seen"), Priority::new(2));
    }
}

#[tokio::test]
async fn on_disconnect_validation() {
    for (db, engine) in engines() {
        let cases: Vec<(&str, &str, Vec<Value>)> = vec![
            ("push", "a", vec![json!(1)]),
            ("setPriority", "a", vec![json!(1)]),
            ("set", "a]", vec![json!(1)]),
            ("cancel", "a", vec![json!(1)]),
            ("update", "a", vec![json!("nope")]),
        ];
        for (method, path, args) in cases {
            let err = engine
                .set_on_disconnect_query(method, path, &args)
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{method}: {err}");
        }
        let err = engine
            .set_on_disconnect_query("push", "a", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Validation(ValidationError::UnknownMethod {
                family: "onDisconnect",
                ..
            })
        ));
        assert_eq!(db.backend_calls(), 0);
    }
}

#[tokio::test]
async fn online_offline_are_idempotent() {
    for (db, engine) in engines() {
        engine.go_offline();
        engine.go_offline();
        assert!(!db.is_online());
        assert!(!db.is_connected());

        engine.go_online();
        engine.go_online();
        assert!(db.is_online());
        assert!(db.is_connected());
    }
}

proptest! {
    #[test]
    fn unknown_constraint_keys_are_rejected(
        constraints in constraints_with_unknown_key_strategy(),
    ) {
        let rt = runtime();
        for (db, engine) in engines() {
            let err = rt
                .block_on(engine.do_get_query(None, Some(&constraints)))
                .unwrap_err();
            prop_assert!(err.is_validation());
            let subscribed = engine.do_subscription_query(
                "value",
                Subscriber::new(|_, _| ()),
                None,
                Some(&constraints),
            );
            prop_assert!(subscribed.is_err());
            prop_assert_eq!(db.backend_calls(), 0);
        }
    }

    #[test]
    fn well_formed_constraints_are_accepted(
        constraints in constraints_strategy(),
        path in path_strategy(),
    ) {
        let rt = runtime();
        for (db, engine) in engines() {
            let result = rt.block_on(engine.do_get_query(Some(&path), Some(&constraints)));
            prop_assert!(result.is_ok());
            prop_assert_eq!(db.backend_calls(), 1);
        }
    }

    #[test]
    fn invalid_paths_are_rejected_everywhere(path in invalid_path_strategy()) {
        let rt = runtime();
        for (db, engine) in engines() {
            prop_assert!(rt.block_on(engine.do_get_query(Some(&path), None)).is_err());
            prop_assert!(rt.block_on(engine.do_write_query("set", &path, &[json!(1)])).is_err());
            prop_assert!(rt
                .block_on(engine.set_on_disconnect_query("remove", &path, &[]))
                .is_err());
            let subscribed = engine.do_subscription_query(
                "value",
                Subscriber::new(|_, _| ()),
                Some(&path),
                None,
            );
            prop_assert!(subscribed.is_err());
            let unsubscribed = engine.do_unsubscription_query("value", None, Some(&path));
            prop_assert!(unsubscribed.is_err());
            prop_assert_eq!(db.backend_calls(), 0);
        }
    }

    #[test]
    fn update_requires_an_object(value in non_object_strategy(), path in path_strategy()) {
        let rt = runtime();
        for (db, engine) in engines() {
            let err = rt
                .block_on(engine.do_write_query("update", &path, &[value.clone()]))
                .unwrap_err();
            prop_assert!(err.is_validation());
            prop_assert_eq!(db.backend_calls(), 0);
        }
    }
}
