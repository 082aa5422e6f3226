//! Query constraint sets.
//!
//! A constraint set arrives as an untrusted JSON object such as
//! `{"orderByChild": "age", "startAt": {"value": 18}, "limitToFirst": 10}`.
//! [`QueryConstraints::parse`] turns it into a typed description or rejects
//! the whole set; nothing is applied partially.

use crate::error::{ValidationError, ValidationResult};
use crate::path::DbPath;
use crate::priority::integral_u64;
use serde_json::{Map, Value};

/// Ordering applied to the children of a location.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    /// Order by child key.
    Key,
    /// Order by node priority.
    Priority,
    /// Order by the child's own value.
    Value,
    /// Order by the value at a nested child path.
    Child(DbPath),
}

/// Limit applied after ordering and range filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Keep the first `n` children.
    First(u32),
    /// Keep the last `n` children.
    Last(u32),
}

/// A scalar bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
}

impl Scalar {
    /// Converts the scalar to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }
}

/// A range bound: a scalar plus an optional tie-breaking child key.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    /// Value compared against the ordering value.
    pub value: Scalar,
    /// Child key used to break ties.
    pub key: Option<String>,
}

impl Bound {
    /// Creates a bound without a key.
    pub fn new(value: Scalar) -> Self {
        Self { value, key: None }
    }

    /// Sets the tie-breaking key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A validated constraint set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryConstraints {
    /// Ordering, if any.
    pub order_by: Option<OrderBy>,
    /// Limit, if any.
    pub limit: Option<Limit>,
    /// Inclusive lower bound.
    pub start_at: Option<Bound>,
    /// Exclusive lower bound.
    pub start_after: Option<Bound>,
    /// Inclusive upper bound.
    pub end_at: Option<Bound>,
    /// Exclusive upper bound.
    pub end_before: Option<Bound>,
    /// Exact match.
    pub equal_to: Option<Bound>,
}

const ORDER_KEYS: [&str; 4] = ["orderByKey", "orderByPriority", "orderByValue", "orderByChild"];
const LIMIT_KEYS: [&str; 2] = ["limitToFirst", "limitToLast"];
const LOWER_KEYS: [&str; 3] = ["startAt", "startAfter", "equalTo"];
const UPPER_KEYS: [&str; 3] = ["endAt", "endBefore", "equalTo"];

impl QueryConstraints {
    /// Parses an optional constraint set. `None` and `null` mean no constraints.
    pub fn parse(raw: Option<&Value>) -> ValidationResult<Self> {
        match raw {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(map)) => Self::parse_map(map),
            Some(other) => Err(ValidationError::ConstraintsNotObject(other.to_string())),
        }
    }

    fn parse_map(map: &Map<String, Value>) -> ValidationResult<Self> {
        for group in [&ORDER_KEYS[..], &LIMIT_KEYS[..], &LOWER_KEYS[..], &UPPER_KEYS[..]] {
            let present: Vec<&str> = group
                .iter()
                .copied()
                .filter(|k| map.contains_key(*k))
                .collect();
            if present.len() > 1 {
                return Err(ValidationError::ConflictingConstraints {
                    first: present[0].to_string(),
                    second: present[1].to_string(),
                });
            }
        }

        let mut constraints = Self::default();
        for (name, value) in map {
            match name.as_str() {
                "orderByKey" => {
                    expect_null(name, value)?;
                    constraints.order_by = Some(OrderBy::Key);
                }
                "orderByPriority" => {
                    expect_null(name, value)?;
                    constraints.order_by = Some(OrderBy::Priority);
                }
                "orderByValue" => {
                    expect_null(name, value)?;
                    constraints.order_by = Some(OrderBy::Value);
                }
                "orderByChild" => {
                    let child = value.as_str().ok_or_else(|| {
                        ValidationError::invalid_constraint(name, "must be a string")
                    })?;
                    let path = DbPath::parse(child).map_err(|e| {
                        ValidationError::invalid_constraint(name, e.to_string())
                    })?;
                    constraints.order_by = Some(OrderBy::Child(path));
                }
                "limitToFirst" => constraints.limit = Some(Limit::First(parse_limit(name, value)?)),
                "limitToLast" => constraints.limit = Some(Limit::Last(parse_limit(name, value)?)),
                "startAt" => constraints.start_at = Some(parse_bound(name, value)?),
                "startAfter" => constraints.start_after = Some(parse_bound(name, value)?),
                "endAt" => constraints.end_at = Some(parse_bound(name, value)?),
                "endBefore" => constraints.end_before = Some(parse_bound(name, value)?),
                "equalTo" => constraints.equal_to = Some(parse_bound(name, value)?),
                unknown => return Err(ValidationError::UnknownConstraint(unknown.to_string())),
            }
        }

        constraints.check_bounds_against_order()?;
        Ok(constraints)
    }

    /// Bounds the backends would refuse for the chosen ordering.
    fn check_bounds_against_order(&self) -> ValidationResult<()> {
        for (name, bound) in self.named_bounds() {
            match self.order_by {
                Some(OrderBy::Key) => {
                    if !matches!(bound.value, Scalar::String(_)) {
                        return Err(ValidationError::invalid_constraint(
                            name,
                            "value must be a string when ordering by key",
                        ));
                    }
                    if bound.key.is_some() {
                        return Err(ValidationError::invalid_constraint(
                            name,
                            "key is not allowed when ordering by key",
                        ));
                    }
                }
                Some(OrderBy::Priority) => {
                    if matches!(bound.value, Scalar::Bool(_)) {
                        return Err(ValidationError::invalid_constraint(
                            name,
                            "value must be null, a number or a string when ordering by priority",
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns every range bound present, with its constraint name.
    pub fn named_bounds(&self) -> impl Iterator<Item = (&'static str, &Bound)> {
        [
            ("startAt", self.start_at.as_ref()),
            ("startAfter", self.start_after.as_ref()),
            ("endAt", self.end_at.as_ref()),
            ("endBefore", self.end_before.as_ref()),
            ("equalTo", self.equal_to.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, bound)| bound.map(|b| (name, b)))
    }

    /// Returns true if no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.order_by.is_none() && self.limit.is_none() && self.named_bounds().next().is_none()
    }
}

fn expect_null(name: &str, value: &Value) -> ValidationResult<()> {
    if value.is_null() {
        Ok(())
    } else {
        Err(ValidationError::invalid_constraint(name, "takes no value"))
    }
}

fn parse_limit(name: &str, value: &Value) -> ValidationResult<u32> {
    let n = match value {
        Value::Number(n) => integral_u64(n),
        _ => None,
    };
    let n = n
        .filter(|n| *n > 0)
        .ok_or_else(|| ValidationError::invalid_constraint(name, "must be a positive integer"))?;
    u32::try_from(n).map_err(|_| {
        ValidationError::invalid_constraint(name, format!("must not exceed {}", u32::MAX))
    })
}

fn parse_bound(name: &str, value: &Value) -> ValidationResult<Bound> {
    let record = value.as_object().ok_or_else(|| {
        ValidationError::invalid_constraint(name, "must be an object with a value")
    })?;

    if let Some(extra) = record.keys().find(|k| *k != "value" && *k != "key") {
        return Err(ValidationError::invalid_constraint(
            name,
            format!("unexpected field {extra:?}"),
        ));
    }

    let scalar = match record.get("value") {
        Some(Value::Null) => Scalar::Null,
        Some(Value::Bool(b)) => Scalar::Bool(*b),
        Some(Value::Number(n)) => Scalar::Number(n.as_f64().ok_or_else(|| {
            ValidationError::invalid_constraint(name, "value is not a finite number")
        })?),
        Some(Value::String(s)) => Scalar::String(s.clone()),
        Some(_) => {
            return Err(ValidationError::invalid_constraint(
                name,
                "value must be a string, boolean, number or null",
            ))
        }
        None => return Err(ValidationError::invalid_constraint(name, "value is required")),
    };

    let key = match record.get("key") {
        None | Some(Value::Null) => None,
        Some(Value::String(key)) => Some(key.clone()),
        Some(_) => return Err(ValidationError::invalid_constraint(name, "key must be a string")),
    };

    Ok(Bound { value: scalar, key })
}
