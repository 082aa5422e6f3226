//! # rtbridge Query Engine
//!
//! One query and mutation surface over the admin and the client realtime
//! database SDKs.
//!
//! Every entry point accepts loosely shaped input (string paths, method
//! names, JSON constraint sets and argument lists), validates it completely,
//! and only then dispatches to the backend selected for the session.
//!
//! ## Key Invariants
//!
//! - Validation happens before any backend call
//! - Validation errors and backend errors stay distinct (`BridgeError`)
//! - The engine keeps no state between calls beyond the backend handle
//! - Backend failures are propagated unmodified and never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;

pub use engine::{QueryEngine, Subscriber};
