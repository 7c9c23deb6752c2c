//! Lifecycle events and their observers.
//!
//! Collaborators (UI, game state) follow a session through
//! [`TransportEvent`]s without touching transport internals. Observers are
//! plain callbacks kept in an [`EventObservers`] list; emitting copies the
//! list under its lock and calls the observers after releasing it, so an
//! observer may subscribe or unsubscribe while being notified.
//!
//! # Example
//!
//! ```
//! use shardwire::events::{EventObservers, TransportEvent};
//!
//! let observers = EventObservers::new();
//! let id = observers.subscribe(|event| {
//!     if let TransportEvent::Disconnected(reason) = event {
//!         println!("lost connection: {}", reason);
//!     }
//! });
//! observers.emit(&TransportEvent::Connected);
//! assert!(observers.unsubscribe(id));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::protocol::Packet;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller asked for it.
    Requested,
    /// The peer closed the stream (zero-byte read).
    RemoteClosed,
    /// Socket read, write or shutdown failed.
    Io(String),
    /// Framing desync or decompression staging overflow.
    Protocol(String),
    /// The send queue hit its byte cap.
    CapacityExceeded,
    /// Resolving or connecting failed.
    ConnectFailed(String),
}

impl DisconnectReason {
    /// Whether the disconnect was caused by a failure rather than a request.
    pub fn is_error(&self) -> bool {
        !matches!(self, DisconnectReason::Requested)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::RemoteClosed => write!(f, "remote closed the connection"),
            DisconnectReason::Io(msg) => write!(f, "socket error: {}", msg),
            DisconnectReason::Protocol(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::CapacityExceeded => write!(f, "send queue capacity exceeded"),
            DisconnectReason::ConnectFailed(msg) => write!(f, "connect failed: {}", msg),
        }
    }
}

impl From<&TransportError> for DisconnectReason {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Protocol(msg) => DisconnectReason::Protocol(msg.clone()),
            TransportError::CapacityExceeded { .. } => DisconnectReason::CapacityExceeded,
            TransportError::ConnectionClosed => DisconnectReason::RemoteClosed,
            other => DisconnectReason::Io(other.to_string()),
        }
    }
}

/// Something that happened on a session.
#[derive(Debug, Clone, Copy)]
pub enum TransportEvent<'a> {
    /// The socket connected.
    Connected,
    /// The session was torn down.
    Disconnected(&'a DisconnectReason),
    /// A packet was received, before inbound handlers run.
    PacketReceived(&'a Packet),
    /// A packet is about to be sent, before outbound handlers run.
    PacketSent(&'a Packet),
}

/// Callback receiving every event.
pub type Observer = dyn Fn(&TransportEvent<'_>) + Send + Sync;

/// Token identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered list of observers.
pub struct EventObservers {
    inner: Mutex<ObserverList>,
}

struct ObserverList {
    entries: Vec<(SubscriptionId, Arc<Observer>)>,
    next_id: u64,
}

impl EventObservers {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ObserverList {
                entries: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Add an observer; it sees events emitted after this call.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&TransportEvent<'_>) + Send + Sync + 'static,
    {
        let mut list = self.inner.lock();
        let id = SubscriptionId(list.next_id);
        list.next_id += 1;
        list.entries.push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.inner.lock();
        let before = list.entries.len();
        list.entries.retain(|(sid, _)| *sid != id);
        list.entries.len() != before
    }

    /// Notify every observer in subscription order.
    pub fn emit(&self, event: &TransportEvent<'_>) {
        let observers: Vec<Arc<Observer>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer(event);
        }
    }

    /// Number of observers.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether there are no observers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventObservers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventObservers")
            .field("observers", &self.len())
            .finish()
    }
}
