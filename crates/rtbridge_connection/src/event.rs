//! Connection events and their subscriber feed.

use parking_lot::RwLock;
use rtbridge_core::BackendError;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

/// An event emitted by the connection monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Waiting for the first connection of this subscription.
    Connecting,
    /// The backend reported a live connection.
    Connected,
    /// An established connection dropped.
    Disconnect,
    /// The liveness signal stayed `false` past the timeout.
    Disconnected,
    /// Waiting for a dropped connection to return.
    Reconnecting,
    /// Human-readable diagnostics, including the database URL.
    Log(String),
    /// The backend cancelled the liveness listener.
    Error(BackendError),
}

impl ConnectionEvent {
    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connecting => "connecting",
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Disconnect => "disconnect",
            ConnectionEvent::Disconnected => "disconnected",
            ConnectionEvent::Reconnecting => "re-connecting",
            ConnectionEvent::Log(_) => "log",
            ConnectionEvent::Error(_) => "error",
        }
    }

    /// Returns true for events that report a state change.
    pub fn is_transition(&self) -> bool {
        !matches!(self, ConnectionEvent::Log(_) | ConnectionEvent::Error(_))
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Log(message) => write!(f, "log: {message}"),
            ConnectionEvent::Error(err) => write!(f, "error: {err}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Distributes events to every live receiver.
///
/// Receivers that have been dropped are pruned on the next emit.
pub struct EventFeed<T> {
    subscribers: RwLock<Vec<Sender<T>>>,
}

impl<T: Clone> EventFeed<T> {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends `event` to every receiver.
    pub fn emit(&self, event: T) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of registered receivers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T: Clone> Default for EventFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(ConnectionEvent::Reconnecting.name(), "re-connecting");
        assert_eq!(ConnectionEvent::Disconnect.to_string(), "disconnect");
        assert_eq!(ConnectionEvent::Log("hi".into()).to_string(), "log: hi");
        assert!(!ConnectionEvent::Log(String::new()).is_transition());
        assert!(ConnectionEvent::Disconnected.is_transition());
    }

    #[test]
    fn every_subscriber_receives() {
        let feed = EventFeed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();

        feed.emit(ConnectionEvent::Connected);

        assert_eq!(a.try_recv().unwrap(), ConnectionEvent::Connected);
        assert_eq!(b.try_recv().unwrap(), ConnectionEvent::Connected);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let feed = EventFeed::new();
        let kept = feed.subscribe();
        drop(feed.subscribe());
        assert_eq!(feed.subscriber_count(), 2);

        feed.emit(ConnectionEvent::Connecting);
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), ConnectionEvent::Connecting);
    }
}
