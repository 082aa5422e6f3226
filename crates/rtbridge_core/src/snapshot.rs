//! Immutable reads of a database location.

use crate::path::DbPath;
use crate::priority::Priority;
use serde_json::Value;

/// The value of a location at a point in time.
///
/// For ordered queries `child_keys` records the order the backend produced;
/// JSON objects do not preserve it on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    path: DbPath,
    value: Value,
    priority: Option<Priority>,
    child_keys: Vec<String>,
}

impl Snapshot {
    /// Creates a snapshot of `value` at `path`.
    pub fn new(path: DbPath, value: Value) -> Self {
        Self {
            path,
            value,
            priority: None,
            child_keys: Vec::new(),
        }
    }

    /// Sets the node priority.
    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the ordered child keys.
    pub fn with_child_keys(mut self, keys: Vec<String>) -> Self {
        self.child_keys = keys;
        self
    }

    /// Location key, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    /// Location path.
    pub fn path(&self) -> &DbPath {
        &self.path
    }

    /// The value; `Value::Null` when nothing exists.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the snapshot, returning the value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns true if data exists at the location.
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Node priority.
    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Child keys in query order.
    pub fn child_keys(&self) -> Vec<&str> {
        if !self.child_keys.is_empty() {
            return self.child_keys.iter().map(String::as_str).collect();
        }
        match &self.value {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Child snapshots in query order.
    pub fn children(&self) -> Vec<Snapshot> {
        self.child_keys()
            .into_iter()
            .filter_map(|key| {
                let value = self.value.get(key)?.clone();
                let path = self.path.child(key).ok()?;
                Some(Snapshot::new(path, value))
            })
            .collect()
    }
}
