//! Queue-backed connection handle.
//!
//! Every socket gets an unbounded outbound queue. The pairing engine pushes
//! into it through [`OutboundConnection`] without ever awaiting; a writer
//! task owned by the transport drains the matching [`OutboundReceiver`]
//! into the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use tandem_protocol::Payload;
use tokio::sync::mpsc;
use tracing::trace;

use crate::traits::{Connection, ConnectionId, TransportError};

/// An item on a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Deliver a payload.
    Payload(Payload),
    /// Close the socket after everything queued before it.
    Close,
}

/// Create a connection handle and the receiving end of its outbound queue.
#[must_use]
pub fn outbound_channel(
    id: ConnectionId,
    remote_addr: Option<String>,
) -> (OutboundConnection, OutboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = OutboundConnection {
        id,
        tx,
        open: AtomicBool::new(true),
        remote_addr,
    };
    (conn, OutboundReceiver { rx })
}

/// Connection handle that queues payloads for a writer task.
#[derive(Debug)]
pub struct OutboundConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    open: AtomicBool,
    remote_addr: Option<String>,
}

impl OutboundConnection {
    /// Mark the connection as no longer writable without queueing a close.
    ///
    /// Used by the transport once the socket is known to be gone.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl Connection for OutboundConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        self.tx.send(Outbound::Payload(payload)).map_err(|_| {
            self.mark_closed();
            TransportError::ConnectionClosed
        })?;

        trace!(connection = %self.id, "Queued outbound payload");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            // Writer may already be gone; nothing left to close then.
            let _ = self.tx.send(Outbound::Close);
        }
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }
}

/// Receiving end of a connection's outbound queue.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl OutboundReceiver {
    /// Wait for the next outbound item.
    ///
    /// Returns `None` once every handle has been dropped.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Take the next outbound item if one is ready.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Drain every payload currently queued, stopping at a close marker.
    pub fn drain_payloads(&mut self) -> Vec<Payload> {
        let mut out = Vec::new();
        while let Some(item) = self.try_recv() {
            match item {
                Outbound::Payload(payload) => out.push(payload),
                Outbound::Close => break,
            }
        }
        out
    }
}
