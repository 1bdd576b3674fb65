//! Connection handle abstraction.
//!
//! The pairing engine never owns a socket. It holds an `Arc<dyn Connection>`
//! keyed by [`ConnectionId`] and uses it to push payloads; the transport
//! owns the socket and reports what happens to it as [`TransportEvent`]s.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tandem_protocol::Payload;
use thiserror::Error;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Inbound message exceeds the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// A handle to one client's outbound side.
///
/// `send` must not block: a slow client may only slow itself down, never the
/// caller. Failures mean the client is gone and are safe to ignore; the
/// transport reports the closure separately.
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Queue a payload for delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection no longer accepts writes.
    fn send(&self, payload: Payload) -> Result<(), TransportError>;

    /// Check if the connection still accepts writes.
    fn is_open(&self) -> bool;

    /// Ask the transport to close the connection. Idempotent.
    fn close(&self);

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}

/// Notifications a transport delivers about a single connection.
///
/// For every `Connected` the transport emits exactly one terminal event,
/// either `Closed` or `Errored`, and no `Received` after it.
#[derive(Clone)]
pub enum TransportEvent {
    /// A client finished its handshake.
    Connected(Arc<dyn Connection>),
    /// A client sent a message.
    Received(ConnectionId, Payload),
    /// The client closed the connection.
    Closed(ConnectionId),
    /// The connection failed.
    Errored(ConnectionId, String),
}

impl TransportEvent {
    /// The connection this event is about.
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            TransportEvent::Connected(conn) => conn.id(),
            TransportEvent::Received(id, _)
            | TransportEvent::Closed(id)
            | TransportEvent::Errored(id, _) => id,
        }
    }

    /// Check if this event ends the connection.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed(_) | TransportEvent::Errored(..))
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Connected(conn) => f.debug_tuple("Connected").field(conn.id()).finish(),
            TransportEvent::Received(id, payload) => f
                .debug_tuple("Received")
                .field(id)
                .field(&payload.len())
                .finish(),
            TransportEvent::Closed(id) => f.debug_tuple("Closed").field(id).finish(),
            TransportEvent::Errored(id, info) => {
                f.debug_tuple("Errored").field(id).field(info).finish()
            }
        }
    }
}
