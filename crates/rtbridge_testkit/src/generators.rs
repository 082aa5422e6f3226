//! Property-based test generators using proptest.
//!
//! Provides strategies for paths, constraint sets and payloads, both
//! well-formed and deliberately malformed.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Every constraint name the query engine accepts.
pub const CONSTRAINT_NAMES: [&str; 11] = [
    "orderByKey",
    "orderByPriority",
    "orderByValue",
    "orderByChild",
    "limitToFirst",
    "limitToLast",
    "endAt",
    "endBefore",
    "equalTo",
    "startAfter",
    "startAt",
];

/// Strategy for a single valid path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{1,8}").expect("Invalid regex")
}

/// Strategy for valid, non-empty paths.
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..4).prop_map(|segments| segments.join("/"))
}

/// Strategy for paths containing at least one forbidden character.
pub fn invalid_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::string::string_regex("[a-z/]{0,6}").expect("Invalid regex"),
        prop::sample::select(vec!['.', '#', '$', '[', ']']),
        prop::string::string_regex("[a-z/]{0,6}").expect("Invalid regex"),
    )
        .prop_map(|(prefix, bad, suffix)| format!("{prefix}{bad}{suffix}"))
}

/// Strategy for constraint names outside the supported set.
pub fn unknown_constraint_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z]{1,14}")
        .expect("Invalid regex")
        .prop_filter("must not be a known constraint", |name| {
            !CONSTRAINT_NAMES.contains(&name.as_str())
        })
}

/// Strategy for scalar bound values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

/// Strategy for well-formed constraint sets.
///
/// Orders by child or value so that any scalar bound is acceptable.
pub fn constraints_strategy() -> impl Strategy<Value = Value> {
    (
        prop::option::of(segment_strategy()),
        prop::option::of((any::<bool>(), 1u32..50)),
        prop::option::of(scalar_strategy()),
        prop::option::of(scalar_strategy()),
    )
        .prop_map(|(child, limit, start, end)| {
            let mut map = Map::new();
            match child {
                Some(child) => map.insert("orderByChild".into(), json!(child)),
                None => map.insert("orderByValue".into(), Value::Null),
            };
            if let Some((first, n)) = limit {
                let name = if first { "limitToFirst" } else { "limitToLast" };
                map.insert(name.into(), json!(n));
            }
            if let Some(start) = start {
                map.insert("startAt".into(), json!({ "value": start }));
            }
            if let Some(end) = end {
                map.insert("endAt".into(), json!({ "value": end }));
            }
            Value::Object(map)
        })
}

/// Strategy for a well-formed set plus one unknown key.
pub fn constraints_with_unknown_key_strategy() -> impl Strategy<Value = Value> {
    (constraints_strategy(), unknown_constraint_strategy(), scalar_strategy()).prop_map(
        |(mut set, name, value)| {
            if let Value::Object(map) = &mut set {
                map.insert(name, value);
            }
            set
        },
    )
}

/// Strategy for JSON values that are not objects.
pub fn non_object_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        scalar_strategy(),
        prop::collection::vec(scalar_strategy(), 0..4).prop_map(Value::Array),
    ]
}
