//! Node priorities.

use crate::error::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::num::NonZeroU64;

/// A positive integer priority.
///
/// A null priority is modelled as `Option::<Priority>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(NonZeroU64);

impl Priority {
    /// Creates a priority, returning `None` for zero.
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    /// Returns the integer value.
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Priority> for Value {
    fn from(priority: Priority) -> Self {
        Value::from(priority.get())
    }
}

/// Validates and coerces a priority value.
///
/// Accepts `null`, a positive integer, or a string of decimal digits that
/// parses to a positive integer.
pub fn check_priority(value: &Value) -> ValidationResult<Option<Priority>> {
    let invalid = || ValidationError::InvalidPriority(value.to_string());
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            let int = integral_u64(n).ok_or_else(invalid)?;
            Priority::new(int).map(Some).ok_or_else(invalid)
        }
        Value::String(s) => {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let int: u64 = s.parse().map_err(|_| invalid())?;
            Priority::new(int).map(Some).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

/// Reads a non-negative integer, accepting floats with no fractional part.
///
/// Floats at or beyond 2^64 are rejected rather than saturated.
pub(crate) fn integral_u64(n: &Number) -> Option<u64> {
    if let Some(int) = n.as_u64() {
        return Some(int);
    }
    let float = n.as_f64()?;
    if float.fract() != 0.0 || float < 0.0 || float >= u64::MAX as f64 {
        return None;
    }
    Some(float as u64)
}
