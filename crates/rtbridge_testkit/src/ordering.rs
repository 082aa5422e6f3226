//! Child ordering, range filtering and limits for in-memory queries.
//!
//! Values sort by type first (null, false, true, numbers, strings, objects),
//! then within the type. Ties break on the child key, where keys that look
//! like 32-bit integers sort numerically ahead of all other keys.

use rtbridge_core::{Bound, Limit, OrderBy, Priority, QueryConstraints};
use serde_json::Value;
use std::cmp::Ordering;

/// A child of a queried location.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Child {
    pub key: String,
    pub value: Value,
    pub priority: Option<Priority>,
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Compares two values in index order.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

fn int_key(key: &str) -> Option<i32> {
    key.parse::<i32>().ok().filter(|n| n.to_string() == key)
}

/// Compares two child keys.
pub(crate) fn compare_keys(a: &str, b: &str) -> Ordering {
    match (int_key(a), int_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn sort_value(order: Option<&OrderBy>, child: &Child) -> Value {
    match order {
        Some(OrderBy::Key) => Value::String(child.key.clone()),
        Some(OrderBy::Value) => child.value.clone(),
        Some(OrderBy::Child(path)) => path
            .segments()
            .try_fold(&child.value, |node, segment| node.get(segment))
            .cloned()
            .unwrap_or(Value::Null),
        Some(OrderBy::Priority) | None => child.priority.map(Value::from).unwrap_or(Value::Null),
    }
}

fn compare_children(order: Option<&OrderBy>, a: &Child, b: &Child) -> Ordering {
    match order {
        Some(OrderBy::Key) => compare_keys(&a.key, &b.key),
        _ => compare_values(&sort_value(order, a), &sort_value(order, b))
            .then_with(|| compare_keys(&a.key, &b.key)),
    }
}

/// Position of `child` relative to `bound`.
///
/// `missing_key` is the answer when the values tie and the bound has no key,
/// which lets one function serve inclusive and exclusive bounds.
fn compare_to_bound(
    order: Option<&OrderBy>,
    child: &Child,
    bound: &Bound,
    missing_key: Ordering,
) -> Ordering {
    let bound_value = bound.value.to_value();
    if let Some(OrderBy::Key) = order {
        return compare_keys(&child.key, bound_value.as_str().unwrap_or_default());
    }
    compare_values(&sort_value(order, child), &bound_value).then_with(|| match &bound.key {
        Some(key) => compare_keys(&child.key, key),
        None => missing_key,
    })
}

fn in_range(constraints: &QueryConstraints, child: &Child) -> bool {
    let order = constraints.order_by.as_ref();
    let lower_inclusive =
        |b: &Bound| compare_to_bound(order, child, b, Ordering::Greater) != Ordering::Less;
    let upper_inclusive =
        |b: &Bound| compare_to_bound(order, child, b, Ordering::Less) != Ordering::Greater;

    if let Some(b) = &constraints.start_at {
        if !lower_inclusive(b) {
            return false;
        }
    }
    if let Some(b) = &constraints.start_after {
        if compare_to_bound(order, child, b, Ordering::Less) != Ordering::Greater {
            return false;
        }
    }
    if let Some(b) = &constraints.end_at {
        if !upper_inclusive(b) {
            return false;
        }
    }
    if let Some(b) = &constraints.end_before {
        if compare_to_bound(order, child, b, Ordering::Greater) != Ordering::Less {
            return false;
        }
    }
    if let Some(b) = &constraints.equal_to {
        if !lower_inclusive(b) || !upper_inclusive(b) {
            return false;
        }
    }
    true
}

/// Sorts, filters and limits children according to `constraints`.
pub(crate) fn evaluate(mut children: Vec<Child>, constraints: &QueryConstraints) -> Vec<Child> {
    let order = constraints.order_by.as_ref();
    children.sort_by(|a, b| compare_children(order, a, b));
    children.retain(|child| in_range(constraints, child));

    match constraints.limit {
        Some(Limit::First(n)) => children.truncate(n as usize),
        Some(Limit::Last(n)) => {
            let n = n as usize;
            if children.len() > n {
                children.drain(..children.len() - n);
            }
        }
        None => {}
    }
    children
}
