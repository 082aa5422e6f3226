//! Write and on-disconnect methods.
//!
//! Callers name a method and pass positional arguments; the arguments are
//! destructured into a typed operation according to the method's shape:
//!
//! | method            | arguments             |
//! |-------------------|-----------------------|
//! | `set`             | `(value)`             |
//! | `push`            | `(value?)`            |
//! | `update`          | `(object)`            |
//! | `remove`          | `()`                  |
//! | `setPriority`     | `(priority)`          |
//! | `setWithPriority` | `(value, priority)`   |
//! | `cancel`          | `()` (on-disconnect)  |

use crate::error::{ValidationError, ValidationResult};
use crate::path::DbPath;
use crate::priority::{check_priority, Priority};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Mutation methods accepted by the write entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteMethod {
    /// Replace the value.
    Set,
    /// Append a child under a generated key.
    Push,
    /// Merge an object of child paths.
    Update,
    /// Delete the value.
    Remove,
    /// Change only the priority.
    SetPriority,
    /// Replace value and priority.
    SetWithPriority,
}

impl WriteMethod {
    /// All write methods.
    pub const ALL: [WriteMethod; 6] = [
        WriteMethod::Set,
        WriteMethod::Push,
        WriteMethod::Update,
        WriteMethod::Remove,
        WriteMethod::SetPriority,
        WriteMethod::SetWithPriority,
    ];

    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMethod::Set => "set",
            WriteMethod::Push => "push",
            WriteMethod::Update => "update",
            WriteMethod::Remove => "remove",
            WriteMethod::SetPriority => "setPriority",
            WriteMethod::SetWithPriority => "setWithPriority",
        }
    }
}

impl fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMethod {
                family: "write",
                name: s.to_string(),
            })
    }
}

/// Mutations that can be scheduled to run when the connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnDisconnectMethod {
    /// Cancel every scheduled mutation at or below the path.
    Cancel,
    /// Replace the value.
    Set,
    /// Merge an object of child paths.
    Update,
    /// Delete the value.
    Remove,
    /// Replace value and priority.
    SetWithPriority,
}

impl OnDisconnectMethod {
    /// All on-disconnect methods.
    pub const ALL: [OnDisconnectMethod; 5] = [
        OnDisconnectMethod::Cancel,
        OnDisconnectMethod::Set,
        OnDisconnectMethod::Update,
        OnDisconnectMethod::Remove,
        OnDisconnectMethod::SetWithPriority,
    ];

    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnDisconnectMethod::Cancel => "cancel",
            OnDisconnectMethod::Set => "set",
            OnDisconnectMethod::Update => "update",
            OnDisconnectMethod::Remove => "remove",
            OnDisconnectMethod::SetWithPriority => "setWithPriority",
        }
    }
}

impl fmt::Display for OnDisconnectMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnDisconnectMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMethod {
                family: "onDisconnect",
                name: s.to_string(),
            })
    }
}

/// A validated write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the value.
    Set(Value),
    /// Append a child; `None` only reserves a key.
    Push(Option<Value>),
    /// Merge child paths.
    Update(Map<String, Value>),
    /// Delete the value.
    Remove,
    /// Change the priority.
    SetPriority(Option<Priority>),
    /// Replace value and priority.
    SetWithPriority(Value, Option<Priority>),
}

impl WriteOp {
    /// Destructures positional arguments according to the method shape.
    pub fn from_args(method: WriteMethod, args: &[Value]) -> ValidationResult<Self> {
        let name = method.as_str();
        Ok(match method {
            WriteMethod::Set => {
                expect_arity(name, args, 1, 1)?;
                WriteOp::Set(args[0].clone())
            }
            WriteMethod::Push => {
                expect_arity(name, args, 0, 1)?;
                WriteOp::Push(args.first().cloned())
            }
            WriteMethod::Update => {
                expect_arity(name, args, 1, 1)?;
                WriteOp::Update(update_object(name, &args[0])?)
            }
            WriteMethod::Remove => {
                expect_arity(name, args, 0, 0)?;
                WriteOp::Remove
            }
            WriteMethod::SetPriority => {
                expect_arity(name, args, 1, 1)?;
                WriteOp::SetPriority(check_priority(&args[0])?)
            }
            WriteMethod::SetWithPriority => {
                expect_arity(name, args, 2, 2)?;
                WriteOp::SetWithPriority(args[0].clone(), check_priority(&args[1])?)
            }
        })
    }

    /// Returns the method this operation was built from.
    pub fn method(&self) -> WriteMethod {
        match self {
            WriteOp::Set(_) => WriteMethod::Set,
            WriteOp::Push(_) => WriteMethod::Push,
            WriteOp::Update(_) => WriteMethod::Update,
            WriteOp::Remove => WriteMethod::Remove,
            WriteOp::SetPriority(_) => WriteMethod::SetPriority,
            WriteOp::SetWithPriority(..) => WriteMethod::SetWithPriority,
        }
    }
}

/// A validated on-disconnect mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum OnDisconnectOp {
    /// Cancel scheduled mutations.
    Cancel,
    /// Replace the value.
    Set(Value),
    /// Merge child paths.
    Update(Map<String, Value>),
    /// Delete the value.
    Remove,
    /// Replace value and priority.
    SetWithPriority(Value, Option<Priority>),
}

impl OnDisconnectOp {
    /// Destructures positional arguments according to the method shape.
    pub fn from_args(method: OnDisconnectMethod, args: &[Value]) -> ValidationResult<Self> {
        let name = method.as_str();
        Ok(match method {
            OnDisconnectMethod::Cancel => {
                expect_arity(name, args, 0, 0)?;
                OnDisconnectOp::Cancel
            }
            OnDisconnectMethod::Set => {
                expect_arity(name, args, 1, 1)?;
                OnDisconnectOp::Set(args[0].clone())
            }
            OnDisconnectMethod::Update => {
                expect_arity(name, args, 1, 1)?;
                OnDisconnectOp::Update(update_object(name, &args[0])?)
            }
            OnDisconnectMethod::Remove => {
                expect_arity(name, args, 0, 0)?;
                OnDisconnectOp::Remove
            }
            OnDisconnectMethod::SetWithPriority => {
                expect_arity(name, args, 2, 2)?;
                OnDisconnectOp::SetWithPriority(args[0].clone(), check_priority(&args[1])?)
            }
        })
    }

    /// Returns the method this operation was built from.
    pub fn method(&self) -> OnDisconnectMethod {
        match self {
            OnDisconnectOp::Cancel => OnDisconnectMethod::Cancel,
            OnDisconnectOp::Set(_) => OnDisconnectMethod::Set,
            OnDisconnectOp::Update(_) => OnDisconnectMethod::Update,
            OnDisconnectOp::Remove => OnDisconnectMethod::Remove,
            OnDisconnectOp::SetWithPriority(..) => OnDisconnectMethod::SetWithPriority,
        }
    }
}

fn expect_arity(method: &str, args: &[Value], min: usize, max: usize) -> ValidationResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ValidationError::invalid_arguments(
            method,
            format!("expected {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

/// `update` payloads must be objects whose keys are valid relative paths.
fn update_object(method: &str, value: &Value) -> ValidationResult<Map<String, Value>> {
    let object = value.as_object().ok_or_else(|| {
        ValidationError::invalid_arguments(method, format!("value must be an object, got {value}"))
    })?;
    for key in object.keys() {
        DbPath::parse(key).map_err(|e| {
            ValidationError::invalid_arguments(method, format!("invalid key {key:?}: {e}"))
        })?;
    }
    Ok(object.clone())
}
