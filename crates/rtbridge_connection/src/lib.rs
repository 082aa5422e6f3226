//! # rtbridge Connection
//!
//! Connection liveness tracking for realtime databases.
//!
//! The admin SDK never reports connection loss, so the monitor listens to
//! the reserved `.info/connected` signal and infers a disconnect when the
//! signal stays `false` for longer than the configured timeout.
//!
//! ## States
//!
//! ```text
//! DISCONNECTED --false--> CONNECTING --true--> CONNECTED
//!      ^                                        |    ^
//!      |                                      false  true
//!      +--------- timeout --- RECONNECTING <----+----+
//! ```
//!
//! ## Key Invariants
//!
//! - One liveness subscription per sign-in, attached on the next scheduler turn
//! - "First connection established" is sticky until the next subscription
//! - At most one disconnect timer is armed; a `true` signal cancels it
//! - Each transition emits its event exactly once
//! - Listener errors are fatal to the subscription and never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod monitor;
mod state;

pub use config::{ConnectionConfig, DEFAULT_DISCONNECT_TIMEOUT};
pub use error::{ConnectionError, ConnectionResult};
pub use event::{ConnectionEvent, EventFeed};
pub use monitor::ConnectionMonitor;
pub use state::ConnectionState;
