//! In-memory realtime database.
//!
//! `MemoryDatabase` implements both SDK shapes over one shared tree, so the
//! same data can be driven through the admin and the client adapters. It
//! keeps listeners, computes child events by diffing query views around each
//! write, queues on-disconnect mutations until the connection drops, and
//! publishes the liveness boolean at `.info/connected`.
//!
//! Test hooks:
//! - [`MemoryDatabase::set_connected`] drives the liveness signal
//! - [`MemoryDatabase::fail_next`] makes the next backend call fail
//! - [`MemoryDatabase::cancel_listeners`] revokes every listener with an error
//! - [`MemoryDatabase::backend_calls`] counts calls that reached the backend

use crate::ordering::{evaluate, Child};
use async_trait::async_trait;
use parking_lot::Mutex;
use rtbridge_core::{
    same_callback, AdminDatabase, BackendError, BackendErrorCode, BackendResult, CancelCallback,
    ClientDatabase, ClientUnsubscribe, DatabaseHandle, DatabaseWrites, DbPath, ListenerCallback,
    ListenerKind, OnDisconnect, OnDisconnectOp, Priority, QueryConstraints, Snapshot,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// A registered listener.
struct Registration {
    id: u64,
    path: DbPath,
    constraints: QueryConstraints,
    kind: ListenerKind,
    callback: ListenerCallback,
    cancel: CancelCallback,
}

/// The result of a query at one point in time.
struct View {
    snapshot: Snapshot,
    children: Vec<Child>,
}

/// A callback invocation collected under the lock and run after it.
struct Delivery {
    callback: ListenerCallback,
    snapshot: Snapshot,
    previous: Option<String>,
}

impl Delivery {
    fn run(self) {
        (self.callback)(&self.snapshot, self.previous.as_deref());
    }
}

struct Store {
    root: Value,
    priorities: BTreeMap<DbPath, Priority>,
    listeners: Vec<Registration>,
    next_listener_id: u64,
    connected: bool,
    online: bool,
    on_disconnect: Vec<(DbPath, OnDisconnectOp)>,
    fail_next: Option<BackendError>,
    deny_listeners: Option<BackendError>,
    push_sequence: u64,
}

struct Inner {
    url: String,
    store: Mutex<Store>,
    calls: AtomicU64,
}

/// An in-memory realtime database implementing both SDK shapes.
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    /// Creates an empty, disconnected database.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                store: Mutex::new(Store {
                    root: Value::Null,
                    priorities: BTreeMap::new(),
                    listeners: Vec::new(),
                    next_listener_id: 1,
                    connected: false,
                    online: true,
                    on_disconnect: Vec::new(),
                    fail_next: None,
                    deny_listeners: None,
                    push_sequence: 0,
                }),
                calls: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a handle that drives this database through the admin SDK shape.
    pub fn admin_handle(&self) -> DatabaseHandle {
        DatabaseHandle::Admin(Arc::new(self.clone()))
    }

    /// Returns a handle that drives this database through the client SDK shape.
    pub fn client_handle(&self) -> DatabaseHandle {
        DatabaseHandle::Client(Arc::new(self.clone()))
    }

    /// Number of calls that reached this backend.
    pub fn backend_calls(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.store.lock().listeners.len()
    }

    /// Number of queued on-disconnect mutations.
    pub fn pending_on_disconnect(&self) -> usize {
        self.inner.store.lock().on_disconnect.len()
    }

    /// Current value at `path` (`Value::Null` when absent).
    pub fn value(&self, path: &str) -> Value {
        let store = self.inner.store.lock();
        match DbPath::parse_optional(Some(path)) {
            Ok(path) => value_at(&store.root, &path).cloned().unwrap_or(Value::Null),
            Err(_) => Value::Null,
        }
    }

    /// Current priority at `path`.
    pub fn priority(&self, path: &str) -> Option<Priority> {
        let path = DbPath::parse(path).ok()?;
        self.inner.store.lock().priorities.get(&path).copied()
    }

    /// Current liveness value.
    pub fn is_connected(&self) -> bool {
        self.inner.store.lock().connected
    }

    /// Whether the transport is forced online.
    pub fn is_online(&self) -> bool {
        self.inner.store.lock().online
    }

    /// Makes the next backend call fail with `error`.
    pub fn fail_next(&self, error: BackendError) {
        self.inner.store.lock().fail_next = Some(error);
    }

    /// Makes every new listener registration fail with `error` until cleared.
    pub fn deny_listeners(&self, error: Option<BackendError>) {
        self.inner.store.lock().deny_listeners = error;
    }

    /// Revokes every attached listener, invoking its cancel callback.
    pub fn cancel_listeners(&self, error: BackendError) {
        let revoked = std::mem::take(&mut self.inner.store.lock().listeners);
        debug!(count = revoked.len(), %error, "revoking listeners");
        for registration in revoked {
            (registration.cancel)(&error);
        }
    }

    /// Changes the liveness signal, as the server would report it.
    ///
    /// A transition to disconnected runs the queued on-disconnect mutations.
    pub fn set_connected(&self, connected: bool) {
        let deliveries = {
            let mut store = self.inner.store.lock();
            if store.connected == connected {
                return;
            }
            let before = store.snapshot_views(|path| path.is_info_connected());
            store.connected = connected;
            let mut deliveries = store.diff(before);

            if !connected {
                let queued = std::mem::take(&mut store.on_disconnect);
                debug!(count = queued.len(), "running on-disconnect mutations");
                for (path, op) in queued {
                    let before = store.snapshot_views(|p| related(p, &path));
                    store.apply_on_disconnect(&path, op);
                    deliveries.extend(store.diff(before));
                }
            }
            trace!(connected, "liveness changed");
            deliveries
        };
        deliver(deliveries);
    }

    /// Simulates the server noticing that this client went away.
    pub fn simulate_disconnect(&self) {
        self.set_connected(false);
    }

    fn record_call(&self) -> BackendResult<()> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        match self.inner.store.lock().fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn mutate(&self, path: &DbPath, apply: impl FnOnce(&mut Store)) -> BackendResult<()> {
        self.record_call()?;
        let deliveries = {
            let mut store = self.inner.store.lock();
            let before = store.snapshot_views(|p| related(p, path));
            apply(&mut store);
            store.diff(before)
        };
        deliver(deliveries);
        Ok(())
    }

    fn read(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot> {
        self.record_call()?;
        Ok(self.inner.store.lock().view(path, constraints).snapshot)
    }

    fn register(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) -> Option<u64> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let (id, deliveries) = {
            let mut store = self.inner.store.lock();
            let denied = store.deny_listeners.clone();
            if let Some(error) = denied {
                drop(store);
                cancel(&error);
                return None;
            }
            let id = store.next_listener_id;
            store.next_listener_id += 1;

            let view = store.view(path, constraints);
            let deliveries = initial_deliveries(path, kind, &callback, view);
            store.listeners.push(Registration {
                id,
                path: path.clone(),
                constraints: constraints.clone(),
                kind,
                callback,
                cancel,
            });
            (id, deliveries)
        };
        debug!(id, %path, %kind, "listener attached");
        deliver(deliveries);
        Some(id)
    }

    fn next_push_key(&self) -> String {
        let mut store = self.inner.store.lock();
        store.push_sequence += 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("-{millis:013}{:07}", store.push_sequence)
    }
}

fn unregister(inner: &Weak<Inner>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner.calls.fetch_add(1, Ordering::SeqCst);
        inner.store.lock().listeners.retain(|r| r.id != id);
        debug!(id, "listener detached");
    }
}

fn deliver(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery.run();
    }
}

fn related(a: &DbPath, b: &DbPath) -> bool {
    a.contains(b) || b.contains(a)
}

fn initial_deliveries(
    path: &DbPath,
    kind: ListenerKind,
    callback: &ListenerCallback,
    view: View,
) -> Vec<Delivery> {
    match kind {
        ListenerKind::Value => vec![Delivery {
            callback: Arc::clone(callback),
            snapshot: view.snapshot,
            previous: None,
        }],
        ListenerKind::ChildAdded => {
            let mut previous = None;
            let mut out = Vec::new();
            for child in view.children {
                let key = child.key.clone();
                if let Some(snapshot) = child_snapshot(path, child) {
                    out.push(Delivery {
                        callback: Arc::clone(callback),
                        snapshot,
                        previous: previous.clone(),
                    });
                }
                previous = Some(key);
            }
            out
        }
        _ => Vec::new(),
    }
}

fn child_snapshot(parent: &DbPath, child: Child) -> Option<Snapshot> {
    let path = parent.child(&child.key).ok()?;
    Some(Snapshot::new(path, child.value).with_priority(child.priority))
}

impl Store {
    fn view(&self, path: &DbPath, constraints: &QueryConstraints) -> View {
        if path.is_info_connected() {
            return View {
                snapshot: Snapshot::new(path.clone(), Value::Bool(self.connected)),
                children: Vec::new(),
            };
        }

        let node = value_at(&self.root, path).cloned().unwrap_or(Value::Null);
        let children: Vec<Child> = match &node {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| Child {
                    key: key.clone(),
                    value: value.clone(),
                    priority: path
                        .child(key)
                        .ok()
                        .and_then(|p| self.priorities.get(&p).copied()),
                })
                .collect(),
            _ => Vec::new(),
        };
        let children = evaluate(children, constraints);
        let keys = children.iter().map(|c| c.key.clone()).collect();

        let value = if constraints.is_empty() {
            node
        } else if children.is_empty() {
            Value::Null
        } else {
            Value::Object(
                children
                    .iter()
                    .map(|c| (c.key.clone(), c.value.clone()))
                    .collect(),
            )
        };

        View {
            snapshot: Snapshot::new(path.clone(), value)
                .with_priority(self.priorities.get(path).copied())
                .with_child_keys(keys),
            children,
        }
    }

    fn snapshot_views(&self, affected: impl Fn(&DbPath) -> bool) -> Vec<(u64, View)> {
        self.listeners
            .iter()
            .filter(|r| affected(&r.path))
            .map(|r| (r.id, self.view(&r.path, &r.constraints)))
            .collect()
    }

    /// Computes the events produced between `before` and the current state.
    fn diff(&self, before: Vec<(u64, View)>) -> Vec<Delivery> {
        let mut out = Vec::new();
        for (id, old) in before {
            let Some(registration) = self.listeners.iter().find(|r| r.id == id) else {
                continue;
            };
            let new = self.view(&registration.path, &registration.constraints);
            let emit = |out: &mut Vec<Delivery>, snapshot: Snapshot, previous: Option<String>| {
                out.push(Delivery {
                    callback: Arc::clone(&registration.callback),
                    snapshot,
                    previous,
                });
            };
            match registration.kind {
                ListenerKind::Value => {
                    if old.snapshot != new.snapshot {
                        emit(&mut out, new.snapshot, None);
                    }
                }
                ListenerKind::ChildRemoved => {
                    for child in old.children {
                        if !new.children.iter().any(|c| c.key == child.key) {
                            if let Some(snapshot) = child_snapshot(&registration.path, child) {
                                emit(&mut out, snapshot, None);
                            }
                        }
                    }
                }
                ListenerKind::ChildAdded
                | ListenerKind::ChildChanged
                | ListenerKind::ChildMoved => {
                    let old_by_key: HashMap<&str, &Child> =
                        old.children.iter().map(|c| (c.key.as_str(), c)).collect();
                    let old_prev = common_predecessors(&old.children, &new.children);
                    let new_prev = common_predecessors(&new.children, &old.children);
                    for (idx, child) in new.children.iter().enumerate() {
                        let previous = idx
                            .checked_sub(1)
                            .map(|i| new.children[i].key.clone());
                        let fire = match (registration.kind, old_by_key.get(child.key.as_str())) {
                            (ListenerKind::ChildAdded, None) => true,
                            (ListenerKind::ChildChanged, Some(prior)) => {
                                prior.value != child.value || prior.priority != child.priority
                            }
                            (ListenerKind::ChildMoved, Some(_)) => {
                                old_prev.get(child.key.as_str()) != new_prev.get(child.key.as_str())
                            }
                            _ => false,
                        };
                        if fire {
                            if let Some(snapshot) =
                                child_snapshot(&registration.path, child.clone())
                            {
                                emit(&mut out, snapshot, previous);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn apply_set(&mut self, path: &DbPath, value: Value) {
        self.priorities.retain(|p, _| !path.contains(p));
        write_at(&mut self.root, path, normalize(value));
    }

    fn apply_update(&mut self, path: &DbPath, values: Map<String, Value>) {
        for (key, value) in values {
            if let Ok(child) = path.child(&key) {
                self.apply_set(&child, value);
            }
        }
    }

    fn apply_priority(&mut self, path: &DbPath, priority: Option<Priority>) {
        match priority {
            Some(priority) => {
                self.priorities.insert(path.clone(), priority);
            }
            None => {
                self.priorities.remove(path);
            }
        }
    }

    fn apply_on_disconnect(&mut self, path: &DbPath, op: OnDisconnectOp) {
        match op {
            OnDisconnectOp::Cancel => {}
            OnDisconnectOp::Set(value) => self.apply_set(path, value),
            OnDisconnectOp::Update(values) => self.apply_update(path, values),
            OnDisconnectOp::Remove => self.apply_set(path, Value::Null),
            OnDisconnectOp::SetWithPriority(value, priority) => {
                self.apply_set(path, value);
                self.apply_priority(path, priority);
            }
        }
    }
}

/// Maps each shared key to its nearest predecessor that `other` also holds.
fn common_predecessors<'a>(
    order: &'a [Child],
    other: &[Child],
) -> HashMap<&'a str, Option<&'a str>> {
    let mut out = HashMap::new();
    let mut previous: Option<&str> = None;
    for child in order {
        if other.iter().any(|c| c.key == child.key) {
            out.insert(child.key.as_str(), previous);
            previous = Some(child.key.as_str());
        }
    }
    out
}

fn value_at<'a>(root: &'a Value, path: &DbPath) -> Option<&'a Value> {
    path.segments().try_fold(root, |node, segment| node.get(segment))
}

/// Drops nulls and empty objects; arrays become index-keyed objects.
fn normalize(value: Value) -> Value {
    let entries: Vec<(String, Value)> = match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        scalar => return scalar,
    };
    let map: Map<String, Value> = entries
        .into_iter()
        .map(|(k, v)| (k, normalize(v)))
        .filter(|(_, v)| !v.is_null())
        .collect();
    if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

fn write_at(root: &mut Value, path: &DbPath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    if value.is_null() {
        remove_at(root, &segments);
        return;
    }
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    ensure_object(node).insert(last.to_string(), value);
}

fn remove_at(node: &mut Value, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Null;
        return;
    };
    let emptied = match node {
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*first);
            } else if let Some(child) = map.get_mut(*first) {
                remove_at(child, rest);
                if child.is_null() {
                    map.remove(*first);
                }
            }
            map.is_empty()
        }
        _ => false,
    };
    if emptied {
        *node = Value::Null;
    }
}

fn check_keys(value: &Value) -> BackendResult<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.is_empty() || key.chars().any(|c| FORBIDDEN_KEY_CHARS.contains(&c)) {
                    return Err(BackendError::new(
                        BackendErrorCode::Other,
                        format!("invalid key {key:?} in written value"),
                    ));
                }
                check_keys(child)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(check_keys),
        _ => Ok(()),
    }
}

#[async_trait]
impl DatabaseWrites for MemoryDatabase {
    fn url(&self) -> String {
        self.inner.url.clone()
    }

    async fn set(&self, path: &DbPath, value: Value) -> BackendResult<()> {
        check_keys(&value)?;
        self.mutate(path, |store| store.apply_set(path, value))
    }

    async fn push(&self, path: &DbPath, value: Option<Value>) -> BackendResult<DbPath> {
        let key = self.next_push_key();
        let child = path
            .child(&key)
            .map_err(|e| BackendError::new(BackendErrorCode::Other, e.to_string()))?;
        match value {
            Some(value) => {
                check_keys(&value)?;
                self.mutate(&child, |store| store.apply_set(&child, value))?;
            }
            None => self.record_call()?,
        }
        Ok(child)
    }

    async fn update(&self, path: &DbPath, values: Map<String, Value>) -> BackendResult<()> {
        values.values().try_for_each(check_keys)?;
        self.mutate(path, |store| store.apply_update(path, values))
    }

    async fn remove(&self, path: &DbPath) -> BackendResult<()> {
        self.mutate(path, |store| store.apply_set(path, Value::Null))
    }

    async fn set_priority(&self, path: &DbPath, priority: Option<Priority>) -> BackendResult<()> {
        self.mutate(path, |store| store.apply_priority(path, priority))
    }

    async fn set_with_priority(
        &self,
        path: &DbPath,
        value: Value,
        priority: Option<Priority>,
    ) -> BackendResult<()> {
        check_keys(&value)?;
        self.mutate(path, |store| {
            store.apply_set(path, value);
            store.apply_priority(path, priority);
        })
    }

    fn on_disconnect(&self, path: &DbPath) -> Box<dyn OnDisconnect> {
        Box::new(MemoryOnDisconnect {
            db: self.clone(),
            path: path.clone(),
        })
    }

    fn go_online(&self) {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.store.lock().online = true;
        self.set_connected(true);
    }

    fn go_offline(&self) {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.store.lock().online = false;
        self.set_connected(false);
    }
}

#[async_trait]
impl AdminDatabase for MemoryDatabase {
    async fn once(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot> {
        self.read(path, constraints)
    }

    fn on(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) {
        self.register(path, constraints, kind, callback, cancel);
    }

    fn off(&self, path: &DbPath, kind: ListenerKind, callback: &ListenerCallback) {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .store
            .lock()
            .listeners
            .retain(|r| {
                !(r.path == *path && r.kind == kind && same_callback(&r.callback, callback))
            });
    }
}

#[async_trait]
impl ClientDatabase for MemoryDatabase {
    async fn get(&self, path: &DbPath, constraints: &QueryConstraints) -> BackendResult<Snapshot> {
        self.read(path, constraints)
    }

    fn listen(
        &self,
        path: &DbPath,
        constraints: &QueryConstraints,
        kind: ListenerKind,
        callback: ListenerCallback,
        cancel: CancelCallback,
    ) -> ClientUnsubscribe {
        let inner = Arc::downgrade(&self.inner);
        match self.register(path, constraints, kind, callback, cancel) {
            Some(id) => Box::new(move || unregister(&inner, id)),
            None => Box::new(|| {}),
        }
    }
}

/// On-disconnect handle for one location.
struct MemoryOnDisconnect {
    db: MemoryDatabase,
    path: DbPath,
}

impl MemoryOnDisconnect {
    fn queue(&self, op: OnDisconnectOp) -> BackendResult<()> {
        self.db.record_call()?;
        let mut store = self.db.inner.store.lock();
        if let OnDisconnectOp::Cancel = op {
            store.on_disconnect.retain(|(p, _)| !self.path.contains(p));
        } else {
            store.on_disconnect.push((self.path.clone(), op));
        }
        Ok(())
    }
}

#[async_trait]
impl OnDisconnect for MemoryOnDisconnect {
    async fn cancel(&self) -> BackendResult<()> {
        self.queue(OnDisconnectOp::Cancel)
    }

    async fn set(&self, value: Value) -> BackendResult<()> {
        check_keys(&value)?;
        self.queue(OnDisconnectOp::Set(value))
    }

    async fn update(&self, values: Map<String, Value>) -> BackendResult<()> {
        values.values().try_for_each(check_keys)?;
        self.queue(OnDisconnectOp::Update(values))
    }

    async fn remove(&self) -> BackendResult<()> {
        self.queue(OnDisconnectOp::Remove)
    }

    async fn set_with_priority(
        &self,
        value: Value,
        priority: Option<Priority>,
    ) -> BackendResult<()> {
        check_keys(&value)?;
        self.queue(OnDisconnectOp::SetWithPriority(value, priority))
    }
}
